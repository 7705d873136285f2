pub mod content;
pub mod extract;
pub mod font;
pub mod reconstruct;

use anyhow::{Result, anyhow};
use lopdf::{Document, Object, ObjectId};

/// Axis-aligned box in page space (PDF bottom-left origin, y grows upward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn overlaps_horizontally(&self, other: &Rect) -> bool {
        self.x0.max(other.x0) < self.x1.min(other.x1)
    }
}

/// One extracted run of text with its position and source font size.
#[derive(Debug, Clone)]
pub struct TextRegion {
    pub bbox: Rect,
    pub text: String,
    pub font_size: f32,
}

const US_LETTER: Rect = Rect {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// Resolve a page's media box, following indirect references and walking up
/// the Pages tree for inherited values. Depth-limited against malformed
/// parent cycles.
pub fn media_box(doc: &Document, page_id: ObjectId) -> Result<Rect> {
    let page = doc
        .get_object(page_id)
        .map_err(|err| anyhow!("failed to resolve page object: {}", err))?;
    media_box_recursive(doc, page, 10)
}

fn media_box_recursive(doc: &Document, page_obj: &Object, depth: usize) -> Result<Rect> {
    if depth == 0 {
        return Ok(US_LETTER);
    }
    let Object::Dictionary(dict) = page_obj else {
        return Ok(US_LETTER);
    };

    if let Ok(media_box) = dict.get(b"MediaBox") {
        let resolved = match media_box {
            Object::Reference(id) => doc
                .get_object(*id)
                .map_err(|err| anyhow!("failed to resolve MediaBox reference: {}", err))?,
            other => other,
        };
        if let Object::Array(values) = resolved {
            if values.len() == 4 {
                let mut coords = [0.0f32; 4];
                for (slot, value) in coords.iter_mut().zip(values) {
                    *slot = number(value)
                        .ok_or_else(|| anyhow!("non-numeric MediaBox coordinate"))?;
                }
                return Ok(Rect::new(coords[0], coords[1], coords[2], coords[3]));
            }
        }
    }

    if let Ok(Object::Reference(parent_id)) = dict.get(b"Parent") {
        if let Ok(parent) = doc.get_object(*parent_id) {
            return media_box_recursive(doc, parent, depth - 1);
        }
    }

    Ok(US_LETTER)
}

pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_dimensions_and_union() {
        let a = Rect::new(10.0, 20.0, 110.0, 40.0);
        let b = Rect::new(50.0, 10.0, 120.0, 30.0);
        assert_eq!(a.width(), 100.0);
        assert_eq!(a.height(), 20.0);
        let u = a.union(&b);
        assert_eq!(u, Rect::new(10.0, 10.0, 120.0, 40.0));
        assert!(a.overlaps_horizontally(&b));
    }

    #[test]
    fn number_handles_integer_and_real() {
        assert_eq!(number(&Object::Integer(12)), Some(12.0));
        assert_eq!(number(&Object::Real(3.5)), Some(3.5));
        assert_eq!(number(&Object::Null), None);
    }
}
