//! Page reconstruction: mask original text and lay translated text into the
//! same bounding boxes.
//!
//! Output pages keep their original content streams untouched; everything
//! drawn here lands in a single overlay stream appended after them, so
//! images and vector art survive unchanged and each mask covers the glyphs
//! beneath it. Each placement attempt re-emits its mask, so no partial
//! attempt ever reaches the output.

use std::fmt::Write;

use anyhow::{Result, anyhow};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use super::font::{OVERLAY_FONT_NAME, OverlayFont};
use super::{Rect, TextRegion};

/// Smallest font size tried before accepting clipped output.
pub const FONT_FLOOR: f32 = 8.0;
/// Largest starting font size, regardless of the source size.
pub const FONT_CEIL: f32 = 18.0;

const LINE_HEIGHT_FACTOR: f32 = 1.2;

struct Placement {
    lines: Vec<String>,
    /// Lines that fit vertically in the box at the attempted size.
    capacity: usize,
    leftover: bool,
}

pub struct PageReconstructor<'a> {
    font: &'a OverlayFont,
}

impl<'a> PageReconstructor<'a> {
    pub fn new(font: &'a OverlayFont) -> Self {
        Self { font }
    }

    /// Build the overlay content stream for one page: per region an opaque
    /// mask over the original box plus the translated text fitted into it.
    pub fn overlay_content(&self, regions: &[TextRegion], translations: &[String]) -> String {
        let mut content = String::from("q\n");
        for (region, translation) in regions.iter().zip(translations) {
            self.place_region(&mut content, region, translation);
        }
        content.push_str("Q\n");
        content
    }

    /// Mask the region and place `text` inside its box, shrinking the font
    /// size one point at a time until the text fits or the floor is reached.
    /// At the floor, lines that do not fit are dropped silently; a box too
    /// short for even one line at the floor gets the mask alone, so no glyph
    /// ever lands outside the masked area.
    fn place_region(&self, out: &mut String, region: &TextRegion, text: &str) {
        let mut size = region.font_size.floor().clamp(FONT_FLOOR, FONT_CEIL);
        loop {
            let placement = self.layout(text, &region.bbox, size);
            if placement.leftover && size > FONT_FLOOR {
                size -= 1.0;
                continue;
            }
            if placement.leftover {
                debug!(
                    text = %text.chars().take(40).collect::<String>(),
                    "text clipped at minimum font size"
                );
            }
            let mut attempt = String::new();
            emit_mask(&mut attempt, &region.bbox);
            let visible = placement.capacity.min(placement.lines.len());
            self.emit_text(&mut attempt, &placement.lines[..visible], &region.bbox, size);
            out.push_str(&attempt);
            return;
        }
    }

    /// Wrap `text` to the box width at `size` and report whether anything
    /// is left over, either vertically (too many lines) or horizontally (a
    /// single word wider than the box).
    fn layout(&self, text: &str, bbox: &Rect, size: f32) -> Placement {
        let width = bbox.width().max(1.0);
        let mut lines: Vec<String> = Vec::new();
        let mut current = String::new();

        for word in text.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if self.font.text_width(&candidate, size) <= width + 0.1 {
                current = candidate;
            } else {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                current = word.to_string();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }

        let overflow_x = lines
            .iter()
            .any(|line| self.font.text_width(line, size) > width + 0.1);

        let line_height = size * LINE_HEIGHT_FACTOR;
        let capacity = if bbox.height() + 0.1 >= size {
            (((bbox.height() - size) / line_height).floor() as usize) + 1
        } else {
            0
        };

        let leftover = overflow_x || lines.len() > capacity;
        Placement {
            lines,
            capacity,
            leftover,
        }
    }

    fn emit_text(&self, out: &mut String, lines: &[String], bbox: &Rect, size: f32) {
        if lines.is_empty() {
            return;
        }
        out.push_str("0 0 0 rg\n0 Tr\n");
        let line_height = size * LINE_HEIGHT_FACTOR;
        for (index, line) in lines.iter().enumerate() {
            let baseline = bbox.y1 - size - line_height * index as f32;
            let _ = writeln!(out, "BT");
            let _ = writeln!(out, "/{} {:.2} Tf", OVERLAY_FONT_NAME, size);
            let _ = writeln!(out, "{:.2} {:.2} Td", bbox.x0, baseline);
            let _ = writeln!(out, "{} Tj", self.font.show_text_operand(line));
            let _ = writeln!(out, "ET");
        }
    }
}

/// Opaque white mask over the full box, drawn above existing content.
/// Pure function of the rectangle: emitting it twice is the same cover.
fn emit_mask(out: &mut String, bbox: &Rect) {
    let _ = writeln!(out, "1 1 1 rg");
    let _ = writeln!(
        out,
        "{:.2} {:.2} {:.2} {:.2} re f",
        bbox.x0,
        bbox.y0,
        bbox.width(),
        bbox.height()
    );
}

/// Append an overlay content stream to the page's `Contents`, promoting a
/// single stream reference to an array when needed.
pub fn append_page_overlay(doc: &mut Document, page_id: ObjectId, content: &str) -> Result<()> {
    let stream = Stream::new(Dictionary::new(), content.as_bytes().to_vec());
    let content_id = doc.add_object(Object::Stream(stream));

    let page = doc
        .get_object_mut(page_id)
        .map_err(|err| anyhow!("failed to resolve page: {}", err))?
        .as_dict_mut()
        .map_err(|err| anyhow!("page is not a dictionary: {}", err))?;

    let existing = page.get(b"Contents").ok().cloned();
    match existing {
        Some(Object::Reference(existing_id)) => {
            page.set(
                "Contents",
                Object::Array(vec![
                    Object::Reference(existing_id),
                    Object::Reference(content_id),
                ]),
            );
        }
        Some(Object::Array(mut streams)) => {
            streams.push(Object::Reference(content_id));
            page.set("Contents", Object::Array(streams));
        }
        _ => {
            page.set("Contents", Object::Reference(content_id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(width: f32, height: f32, font_size: f32) -> TextRegion {
        TextRegion {
            bbox: Rect::new(72.0, 700.0 - height, 72.0 + width, 700.0),
            text: "original".to_string(),
            font_size,
        }
    }

    fn final_font_size(content: &str) -> f32 {
        let marker = format!("/{} ", OVERLAY_FONT_NAME);
        let start = content.rfind(&marker).expect("font op present") + marker.len();
        let rest = &content[start..];
        let end = rest.find(" Tf").expect("Tf terminator");
        rest[..end].parse().expect("numeric font size")
    }

    #[test]
    fn mask_emission_is_idempotent() {
        let bbox = Rect::new(10.0, 20.0, 110.0, 40.0);
        let mut once = String::new();
        emit_mask(&mut once, &bbox);
        let mut twice = String::new();
        emit_mask(&mut twice, &bbox);
        emit_mask(&mut twice, &bbox);
        assert_eq!(twice, once.repeat(2));
        assert!(once.contains("1 1 1 rg"));
        assert!(once.contains("10.00 20.00 100.00 20.00 re f"));
    }

    #[test]
    fn source_font_size_is_clamped_into_range() {
        let font = OverlayFont::Builtin;
        let reconstructor = PageReconstructor::new(&font);

        let huge = region(500.0, 100.0, 36.0);
        let content = reconstructor.overlay_content(&[huge], &["hi".to_string()]);
        assert_eq!(final_font_size(&content), 18.0);

        let tiny = region(500.0, 100.0, 4.0);
        let content = reconstructor.overlay_content(&[tiny], &["hi".to_string()]);
        assert_eq!(final_font_size(&content), 8.0);
    }

    #[test]
    fn overflowing_text_shrinks_to_floor_and_is_accepted() {
        let font = OverlayFont::Builtin;
        let reconstructor = PageReconstructor::new(&font);
        let small = region(60.0, 14.0, 14.0);
        let long = "a translation far too long to ever fit inside such a small box"
            .to_string();
        let content = reconstructor.overlay_content(&[small], &[long]);
        let size = final_font_size(&content);
        assert_eq!(size, FONT_FLOOR);
        // Clipped, not dropped: at least one line was placed.
        assert!(content.contains(" Tj"));
    }

    #[test]
    fn box_shorter_than_floor_font_gets_mask_only() {
        let font = OverlayFont::Builtin;
        let reconstructor = PageReconstructor::new(&font);
        // A 6pt footnote: the clamp raises the font to the floor, but the
        // box cannot hold a floor-sized line, so only the mask is drawn.
        let shallow = region(200.0, 6.0, 6.0);
        let content = reconstructor.overlay_content(&[shallow], &["short note".to_string()]);
        assert!(content.contains("1 1 1 rg"));
        assert!(
            !content.contains("BT"),
            "text must not escape the masked box: {}",
            content
        );
    }

    #[test]
    fn fitting_text_keeps_the_clamped_source_size() {
        let font = OverlayFont::Builtin;
        let reconstructor = PageReconstructor::new(&font);
        let roomy = region(400.0, 30.0, 12.0);
        let content = reconstructor.overlay_content(&[roomy], &["short".to_string()]);
        assert_eq!(final_font_size(&content), 12.0);
    }

    #[test]
    fn every_region_gets_mask_before_text() {
        let font = OverlayFont::Builtin;
        let reconstructor = PageReconstructor::new(&font);
        let regions = vec![region(200.0, 20.0, 12.0), region(200.0, 20.0, 12.0)];
        let texts = vec!["one".to_string(), "two".to_string()];
        let content = reconstructor.overlay_content(&regions, &texts);
        assert_eq!(content.matches("1 1 1 rg").count(), 2);
        let mask_pos = content.find("1 1 1 rg").unwrap();
        let text_pos = content.find("BT").unwrap();
        assert!(mask_pos < text_pos);
        assert!(content.starts_with("q\n"));
        assert!(content.ends_with("Q\n"));
    }

    #[test]
    fn append_promotes_contents_reference_to_array() {
        use lopdf::dictionary;
        let mut doc = Document::with_version("1.5");
        let original = doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            b"q Q".to_vec(),
        )));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => original,
        });
        append_page_overlay(&mut doc, page_id, "q\nQ\n").unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        match page.get(b"Contents").unwrap() {
            Object::Array(streams) => {
                assert_eq!(streams.len(), 2);
                assert_eq!(streams[0], Object::Reference(original));
            }
            other => panic!("expected contents array, got {:?}", other),
        }
    }
}
