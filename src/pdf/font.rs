//! Overlay font handling: metrics for width measurement, document embedding,
//! and show-string emission for the appended overlay content.
//!
//! A configured TTF is embedded as a Type0 / CIDFontType2 font with
//! Identity-H encoding, so overlay text is emitted as hex glyph-ID runs.
//! When the font file is absent the built-in Helvetica is used instead with
//! WinAnsi literal strings; non-Latin characters degrade to `?` there.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::warn;
use ttf_parser::Face;

/// Resource name the overlay content refers to (`/Ftrans <size> Tf`).
pub const OVERLAY_FONT_NAME: &str = "Ftrans";

const FALLBACK_BASE_FONT: &str = "Helvetica";

#[derive(Debug, Clone, Copy)]
struct Glyph {
    id: u16,
    advance: u16,
}

/// Metrics read once from the font file at load time; width measurement and
/// show-string emission run off the cached glyph table, never reparsing the
/// face.
#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    glyphs: HashMap<char, Glyph>,
}

/// The font used for all translated text on the output document.
#[derive(Clone)]
pub enum OverlayFont {
    Embedded(FontMetrics),
    Builtin,
}

impl OverlayFont {
    /// Load the configured font file, falling back to the built-in font with
    /// a single warning when it is missing or unparseable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(data) => match parse_metrics(&data) {
                Ok(metrics) => OverlayFont::Embedded(metrics),
                Err(err) => {
                    warn!(
                        font = %path.display(),
                        error = %err,
                        "font file unusable, falling back to built-in font"
                    );
                    OverlayFont::Builtin
                }
            },
            Err(_) => {
                warn!(
                    font = %path.display(),
                    "font file not found, falling back to built-in font"
                );
                OverlayFont::Builtin
            }
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, OverlayFont::Embedded(_))
    }

    /// Width of `text` at `font_size`, in points.
    pub fn text_width(&self, text: &str, font_size: f32) -> f32 {
        match self {
            OverlayFont::Embedded(metrics) => metrics.text_width(text, font_size),
            OverlayFont::Builtin => estimate_text_width_units(text) * font_size,
        }
    }

    /// The operand of a `Tj` for `text`: a hex glyph-ID run for the embedded
    /// font, an escaped literal string for the built-in one.
    pub fn show_text_operand(&self, text: &str) -> String {
        match self {
            OverlayFont::Embedded(metrics) => {
                let mut hex = String::with_capacity(text.len() * 4);
                for ch in text.chars() {
                    let glyph = metrics.glyphs.get(&ch).map(|glyph| glyph.id).unwrap_or(0);
                    hex.push_str(&format!("{:04X}", glyph));
                }
                format!("<{}>", hex)
            }
            OverlayFont::Builtin => {
                let mut escaped = String::with_capacity(text.len());
                for ch in text.chars() {
                    match ch {
                        '(' => escaped.push_str("\\("),
                        ')' => escaped.push_str("\\)"),
                        '\\' => escaped.push_str("\\\\"),
                        ch if (ch as u32) <= 0xFF => escaped.push(ch),
                        _ => escaped.push('?'),
                    }
                }
                format!("({})", escaped)
            }
        }
    }
}

impl FontMetrics {
    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let glyph_advance = self
                .glyphs
                .get(&ch)
                .map(|glyph| glyph.advance)
                .unwrap_or(self.space_advance);
            advance = advance.saturating_add(glyph_advance as u32);
        }
        let units = self.units_per_em.max(1) as f32;
        advance as f32 * (font_size / units)
    }
}

fn parse_metrics(data: &[u8]) -> Result<FontMetrics> {
    let face = Face::parse(data, 0).map_err(|err| anyhow!("failed to parse font: {}", err))?;
    let units_per_em = face.units_per_em().max(1);
    let space_advance = face
        .glyph_index(' ')
        .and_then(|id| face.glyph_hor_advance(id))
        .unwrap_or(units_per_em / 2);

    let mut glyphs = HashMap::new();
    if let Some(cmap) = face.tables().cmap {
        for subtable in cmap.subtables {
            if !subtable.is_unicode() {
                continue;
            }
            subtable.codepoints(|code_point| {
                let Some(ch) = char::from_u32(code_point) else {
                    return;
                };
                if glyphs.contains_key(&ch) {
                    return;
                }
                if let Some(id) = subtable.glyph_index(code_point) {
                    let advance = face.glyph_hor_advance(id).unwrap_or(space_advance);
                    glyphs.insert(ch, Glyph { id: id.0, advance });
                }
            });
        }
    }

    Ok(FontMetrics {
        data: Arc::new(data.to_vec()),
        units_per_em,
        space_advance,
        glyphs,
    })
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    ) {
        1.0
    } else {
        0.9
    }
}

pub(crate) fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units_for_width).sum()
}

/// Add the overlay font's object graph to `doc`, returning the font object
/// to reference from page resources. Called once per output document.
pub fn embed_overlay_font(doc: &mut Document, font: &OverlayFont) -> Result<ObjectId> {
    match font {
        OverlayFont::Embedded(metrics) => embed_cid_font(doc, metrics),
        OverlayFont::Builtin => {
            let id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => FALLBACK_BASE_FONT,
                "Encoding" => "WinAnsiEncoding",
            });
            Ok(id)
        }
    }
}

fn embed_cid_font(doc: &mut Document, metrics: &FontMetrics) -> Result<ObjectId> {
    let face = Face::parse(&metrics.data, 0)
        .map_err(|err| anyhow!("failed to parse embedded font: {}", err))?;
    let units = metrics.units_per_em.max(1) as f32;
    let scale = 1000.0 / units;
    let base_name = "TranslatedText";

    let font_stream_id = doc.add_object(Stream::new(
        dictionary! { "Length1" => metrics.data.len() as i64 },
        metrics.data.as_ref().clone(),
    ));

    let bbox = face.global_bounding_box();
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => base_name,
        // Symbolic; glyph identities come from the font itself.
        "Flags" => 4,
        "FontBBox" => vec![
            Object::Integer((bbox.x_min as f32 * scale) as i64),
            Object::Integer((bbox.y_min as f32 * scale) as i64),
            Object::Integer((bbox.x_max as f32 * scale) as i64),
            Object::Integer((bbox.y_max as f32 * scale) as i64),
        ],
        "ItalicAngle" => 0,
        "Ascent" => (face.ascender() as f32 * scale) as i64,
        "Descent" => (face.descender() as f32 * scale) as i64,
        "CapHeight" => face
            .capital_height()
            .map(|height| (height as f32 * scale) as i64)
            .unwrap_or(700),
        "StemV" => 80,
        "FontFile2" => font_stream_id,
    });

    // One contiguous W entry covering every glyph keeps advances correct
    // without per-range bookkeeping.
    let widths: Vec<Object> = (0..face.number_of_glyphs())
        .map(|gid| {
            let advance = face
                .glyph_hor_advance(ttf_parser::GlyphId(gid))
                .unwrap_or(metrics.space_advance);
            Object::Integer((advance as f32 * scale) as i64)
        })
        .collect();

    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => base_name,
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 1000,
        "W" => vec![Object::Integer(0), Object::Array(widths)],
        "CIDToGIDMap" => "Identity",
    });

    let to_unicode_id = doc.add_object(Stream::new(
        dictionary! {},
        IDENTITY_TO_UNICODE_CMAP.as_bytes().to_vec(),
    ));

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => base_name,
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
        "ToUnicode" => to_unicode_id,
    });

    Ok(font_id)
}

const IDENTITY_TO_UNICODE_CMAP: &str = "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
endcmap
CMapName currentdict /CMap defineresource pop
end
end
";

/// Register the overlay font under `name` in the page's font resources,
/// preserving whatever resources the page already has (inline, referenced,
/// or inherited from the Pages tree).
pub fn register_page_font(
    doc: &mut Document,
    page_id: ObjectId,
    name: &str,
    font_id: ObjectId,
) -> Result<()> {
    let resources = {
        let page = doc
            .get_dictionary(page_id)
            .map_err(|err| anyhow!("failed to resolve page dictionary: {}", err))?;
        page.get(b"Resources").ok().cloned()
    };

    match resources {
        Some(Object::Reference(resources_id)) => {
            let fonts = {
                let resources = doc
                    .get_dictionary(resources_id)
                    .map_err(|err| anyhow!("failed to resolve page resources: {}", err))?;
                resources.get(b"Font").ok().cloned()
            };
            match fonts {
                Some(Object::Reference(fonts_id)) => {
                    set_font_entry_at(doc, fonts_id, name, font_id)?;
                }
                Some(Object::Dictionary(mut fonts)) => {
                    fonts.set(name, Object::Reference(font_id));
                    let resources = resolve_dict_mut(doc, resources_id)?;
                    resources.set("Font", Object::Dictionary(fonts));
                }
                _ => {
                    let mut fonts = Dictionary::new();
                    fonts.set(name, Object::Reference(font_id));
                    let resources = resolve_dict_mut(doc, resources_id)?;
                    resources.set("Font", Object::Dictionary(fonts));
                }
            }
        }
        Some(Object::Dictionary(mut inline)) => {
            match inline.get(b"Font").ok().cloned() {
                Some(Object::Reference(fonts_id)) => {
                    set_font_entry_at(doc, fonts_id, name, font_id)?;
                }
                Some(Object::Dictionary(mut fonts)) => {
                    fonts.set(name, Object::Reference(font_id));
                    inline.set("Font", Object::Dictionary(fonts));
                }
                _ => {
                    let mut fonts = Dictionary::new();
                    fonts.set(name, Object::Reference(font_id));
                    inline.set("Font", Object::Dictionary(fonts));
                }
            }
            let page = resolve_dict_mut(doc, page_id)?;
            page.set("Resources", Object::Dictionary(inline));
        }
        _ => {
            // No resources on the page itself; start from any inherited
            // dictionary so the original content keeps its fonts.
            let mut base = inherited_resources(doc, page_id).unwrap_or_else(Dictionary::new);
            let mut fonts = match base.get(b"Font").ok().cloned() {
                Some(Object::Dictionary(fonts)) => fonts,
                _ => Dictionary::new(),
            };
            fonts.set(name, Object::Reference(font_id));
            base.set("Font", Object::Dictionary(fonts));
            let page = resolve_dict_mut(doc, page_id)?;
            page.set("Resources", Object::Dictionary(base));
        }
    }

    Ok(())
}

fn set_font_entry_at(
    doc: &mut Document,
    fonts_id: ObjectId,
    name: &str,
    font_id: ObjectId,
) -> Result<()> {
    let fonts = resolve_dict_mut(doc, fonts_id)?;
    fonts.set(name, Object::Reference(font_id));
    Ok(())
}

fn resolve_dict_mut(doc: &mut Document, id: ObjectId) -> Result<&mut Dictionary> {
    doc.get_object_mut(id)
        .map_err(|err| anyhow!("failed to resolve object {:?}: {}", id, err))?
        .as_dict_mut()
        .map_err(|err| anyhow!("object {:?} is not a dictionary: {}", id, err))
}

fn inherited_resources(doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..10 {
        if let Ok(resources) = current.get(b"Resources") {
            return match resources {
                Object::Dictionary(dict) => Some(dict.clone()),
                Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
                _ => None,
            };
        }
        let Ok(Object::Reference(parent_id)) = current.get(b"Parent") else {
            return None;
        };
        current = doc.get_dictionary(*parent_id).ok()?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_show_operand_escapes_and_degrades() {
        let font = OverlayFont::Builtin;
        assert_eq!(font.show_text_operand("a(b)c\\"), "(a\\(b\\)c\\\\)");
        assert_eq!(font.show_text_operand("नमस्ते"), "(??????)");
    }

    #[test]
    fn builtin_width_grows_with_text() {
        let font = OverlayFont::Builtin;
        let short = font.text_width("hi", 12.0);
        let long = font.text_width("hello there world", 12.0);
        assert!(long > short);
        assert!(short > 0.0);
    }

    #[test]
    fn width_scales_linearly_with_font_size() {
        let font = OverlayFont::Builtin;
        let at_ten = font.text_width("sample", 10.0);
        let at_twenty = font.text_width("sample", 20.0);
        assert!((at_twenty - at_ten * 2.0).abs() < 0.001);
    }

    #[test]
    fn embedded_font_runs_off_cached_glyph_table() {
        let mut glyphs = HashMap::new();
        glyphs.insert('a', Glyph { id: 42, advance: 600 });
        let font = OverlayFont::Embedded(FontMetrics {
            data: Arc::new(Vec::new()),
            units_per_em: 1000,
            space_advance: 250,
            glyphs,
        });
        assert_eq!(font.show_text_operand("a"), "<002A>");
        assert!((font.text_width("a", 10.0) - 6.0).abs() < 1e-4);
        // Unmapped characters map to glyph 0 and the space advance.
        assert_eq!(font.show_text_operand("b"), "<0000>");
        assert!((font.text_width("b", 10.0) - 2.5).abs() < 1e-4);
    }

    #[test]
    fn missing_font_file_falls_back_to_builtin() {
        let font = OverlayFont::load(Path::new("/nonexistent/font.ttf"));
        assert!(!font.is_embedded());
    }

    #[test]
    fn builtin_font_embeds_as_type1() {
        let mut doc = Document::with_version("1.5");
        let font_id = embed_overlay_font(&mut doc, &OverlayFont::Builtin).unwrap();
        let font = doc.get_dictionary(font_id).unwrap();
        assert_eq!(font.get(b"Subtype").unwrap(), &Object::Name(b"Type1".to_vec()));
        assert_eq!(
            font.get(b"BaseFont").unwrap(),
            &Object::Name(b"Helvetica".to_vec())
        );
    }
}
