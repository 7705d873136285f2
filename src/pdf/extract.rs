//! Three-tier text region extraction.
//!
//! Tiers are tried in order and the first one that yields any region wins:
//! line-level grouping of spans decoded through the page's font encodings,
//! block-level merging of spans from a lenient byte-level decode, and
//! finally whole-page plain text mapped onto synthesized bands. A tier that
//! errors counts as empty, so extraction never fails a page.

use std::cell::OnceCell;

use anyhow::Result;
use lopdf::{Document, ObjectId};
use tracing::{debug, warn};

use super::content::{self, DecodeMode, TextSpan};
use super::font::OverlayFont;
use super::{Rect, TextRegion, media_box};

/// Font size assigned when the source size is unknown (coarse tiers).
const DEFAULT_FONT_SIZE: f32 = 12.0;

/// Baseline distance, as a multiple of font size, within which spans belong
/// to the same line.
const LINE_TOLERANCE_FACTOR: f32 = 0.5;

/// Horizontal gap, as a multiple of font size, above which a space is
/// inserted between adjacent spans on a line.
const WORD_GAP_FACTOR: f32 = 0.3;

/// Vertical gap, as a multiple of font size, within which lines merge into
/// one block.
const BLOCK_GAP_FACTOR: f32 = 0.8;

pub struct TextExtractor<'a> {
    doc: &'a Document,
    raw: &'a [u8],
    font: &'a OverlayFont,
    plain_text: OnceCell<Option<String>>,
}

impl<'a> TextExtractor<'a> {
    pub fn new(doc: &'a Document, raw: &'a [u8], font: &'a OverlayFont) -> Self {
        Self {
            doc,
            raw,
            font,
            plain_text: OnceCell::new(),
        }
    }

    /// Extract regions for one page, falling through the tiers. An empty
    /// result means the page passes through untouched.
    pub fn extract_page(&self, page_id: ObjectId, page_index: usize) -> Vec<TextRegion> {
        match self.line_tier(page_id) {
            Ok(regions) if !regions.is_empty() => return regions,
            Ok(_) => {}
            Err(err) => warn!(page = page_index + 1, error = %err, "line extraction failed"),
        }

        match self.block_tier(page_id) {
            Ok(regions) if !regions.is_empty() => {
                debug!(page = page_index + 1, "fell back to block-level extraction");
                return regions;
            }
            Ok(_) => {}
            Err(err) => warn!(page = page_index + 1, error = %err, "block extraction failed"),
        }

        match self.plain_text_tier(page_id, page_index) {
            Ok(regions) if !regions.is_empty() => {
                debug!(
                    page = page_index + 1,
                    "fell back to plain-text extraction with synthesized boxes"
                );
                regions
            }
            Ok(regions) => regions,
            Err(err) => {
                warn!(page = page_index + 1, error = %err, "plain-text extraction failed");
                Vec::new()
            }
        }
    }

    /// Structured tier: one region per reconstructed line of spans decoded
    /// through the page's font encodings.
    fn line_tier(&self, page_id: ObjectId) -> Result<Vec<TextRegion>> {
        let spans =
            content::extract_spans(self.doc, page_id, self.font, DecodeMode::FontEncodings)?;
        Ok(group_lines(spans, self.font)
            .into_iter()
            .filter(|region| !region.text.trim().is_empty())
            .collect())
    }

    /// Coarse tier: a lenient byte-level decode of the same streams, with
    /// the lines merged into blocks by vertical adjacency. Picks up pages
    /// whose fonts carry no resolvable encoding.
    fn block_tier(&self, page_id: ObjectId) -> Result<Vec<TextRegion>> {
        let spans = content::extract_spans(self.doc, page_id, self.font, DecodeMode::Lenient)?;
        let lines = group_lines(spans, self.font);
        Ok(merge_blocks(lines)
            .into_iter()
            .filter(|region| !region.text.trim().is_empty())
            .collect())
    }

    /// Last-resort tier: whole-page plain text split into equal-height
    /// horizontal bands, top to bottom. Positions are approximate.
    fn plain_text_tier(&self, page_id: ObjectId, page_index: usize) -> Result<Vec<TextRegion>> {
        let Some(text) = self.page_plain_text(page_index) else {
            return Ok(Vec::new());
        };
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let page_box = media_box(self.doc, page_id)?;
        let band_height = page_box.height() / lines.len() as f32;
        let regions = lines
            .into_iter()
            .enumerate()
            .map(|(index, line)| {
                let y1 = page_box.y1 - band_height * index as f32;
                TextRegion {
                    bbox: Rect::new(page_box.x0, y1 - band_height, page_box.x1, y1),
                    text: line.to_string(),
                    font_size: DEFAULT_FONT_SIZE,
                }
            })
            .collect();
        Ok(regions)
    }

    fn page_plain_text(&self, page_index: usize) -> Option<String> {
        let full = self
            .plain_text
            .get_or_init(|| match pdf_extract::extract_text_from_mem(self.raw) {
                Ok(text) => Some(text),
                Err(err) => {
                    warn!(error = %err, "plain-text extraction of document failed");
                    None
                }
            })
            .as_deref()?;

        // pdf-extract separates pages with form feeds; when it does not,
        // only a single-page document can be attributed safely.
        let pages: Vec<&str> = full.split('\u{c}').collect();
        if page_index < pages.len() {
            Some(pages[page_index].to_string())
        } else if page_index == 0 {
            Some(full.to_string())
        } else {
            None
        }
    }
}

fn span_bbox(span: &TextSpan, font: &OverlayFont) -> Rect {
    let width = font.text_width(&span.text, span.font_size);
    Rect::new(
        span.x,
        span.y - 0.2 * span.font_size,
        span.x + width,
        span.y + 0.8 * span.font_size,
    )
}

/// Group spans into lines by baseline proximity: sort top-to-bottom then
/// left-to-right, and start a new line when the baseline moves more than the
/// tolerance.
fn group_lines(mut spans: Vec<TextSpan>, font: &OverlayFont) -> Vec<TextRegion> {
    if spans.is_empty() {
        return Vec::new();
    }
    spans.sort_by(|a, b| {
        b.y.partial_cmp(&a.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut lines = Vec::new();
    let mut current: Vec<TextSpan> = vec![spans[0].clone()];
    for span in spans.into_iter().skip(1) {
        let anchor = &current[0];
        let tolerance = anchor.font_size.max(1.0) * LINE_TOLERANCE_FACTOR;
        if (span.y - anchor.y).abs() <= tolerance {
            current.push(span);
        } else {
            lines.push(build_line(&current, font));
            current = vec![span];
        }
    }
    lines.push(build_line(&current, font));
    lines
}

fn build_line(spans: &[TextSpan], font: &OverlayFont) -> TextRegion {
    let mut ordered: Vec<&TextSpan> = spans.iter().collect();
    ordered.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));

    let font_size = ordered[0].font_size;
    let mut text = String::new();
    let mut bbox = span_bbox(ordered[0], font);
    let mut pen = bbox.x1;

    for (index, span) in ordered.iter().enumerate() {
        if index > 0 {
            let gap = span.x - pen;
            if gap > font_size * WORD_GAP_FACTOR && !text.ends_with(' ') {
                text.push(' ');
            }
            bbox = bbox.union(&span_bbox(span, font));
        }
        text.push_str(&span.text);
        pen = span.x + font.text_width(&span.text, span.font_size);
    }

    TextRegion {
        bbox,
        text,
        font_size,
    }
}

/// Merge lines into blocks when they are vertically adjacent and overlap
/// horizontally. Block regions carry the default font size.
fn merge_blocks(lines: Vec<TextRegion>) -> Vec<TextRegion> {
    let mut blocks: Vec<TextRegion> = Vec::new();
    for line in lines {
        let merged = match blocks.last_mut() {
            Some(block) => {
                let gap = block.bbox.y0 - line.bbox.y1;
                let adjacent = gap < block.font_size.max(line.font_size) * BLOCK_GAP_FACTOR
                    && block.bbox.overlaps_horizontally(&line.bbox);
                if adjacent {
                    block.bbox = block.bbox.union(&line.bbox);
                    if !block.text.is_empty() && !line.text.is_empty() {
                        block.text.push(' ');
                    }
                    block.text.push_str(&line.text);
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if !merged {
            blocks.push(line);
        }
    }
    for block in &mut blocks {
        block.font_size = DEFAULT_FONT_SIZE;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, StringFormat, dictionary};

    fn span(x: f32, y: f32, text: &str, font_size: f32) -> TextSpan {
        TextSpan {
            x,
            y,
            text: text.to_string(),
            font_size,
        }
    }

    #[test]
    fn spans_on_one_baseline_form_one_line() {
        let spans = vec![
            span(72.0, 700.0, "Hello", 12.0),
            span(120.0, 700.2, "World", 12.0),
        ];
        let lines = group_lines(spans, &OverlayFont::Builtin);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Hello World");
        assert_eq!(lines[0].font_size, 12.0);
    }

    #[test]
    fn distant_baselines_split_lines() {
        let spans = vec![
            span(72.0, 700.0, "first", 12.0),
            span(72.0, 650.0, "second", 12.0),
        ];
        let lines = group_lines(spans, &OverlayFont::Builtin);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "first");
        assert_eq!(lines[1].text, "second");
        assert!(lines[0].bbox.y0 > lines[1].bbox.y1);
    }

    #[test]
    fn line_font_size_comes_from_first_span() {
        let spans = vec![
            span(72.0, 700.0, "big", 16.0),
            span(120.0, 700.0, "small", 9.0),
        ];
        let lines = group_lines(spans, &OverlayFont::Builtin);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].font_size, 16.0);
    }

    #[test]
    fn page_without_resolvable_fonts_falls_back_to_coarse_tier() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        b"Hello fallback".to_vec(),
                        StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(lopdf::Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        // No font resources anywhere, so encoding resolution yields nothing.
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let font = OverlayFont::Builtin;
        let extractor = TextExtractor::new(&doc, &[], &font);
        assert!(extractor.line_tier(page_id).unwrap().is_empty());
        let regions = extractor.extract_page(page_id, 0);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "Hello fallback");
        assert_eq!(regions[0].font_size, DEFAULT_FONT_SIZE);
    }

    #[test]
    fn adjacent_lines_merge_into_one_block() {
        let lines = vec![
            TextRegion {
                bbox: Rect::new(72.0, 690.0, 300.0, 702.0),
                text: "first line".to_string(),
                font_size: 12.0,
            },
            TextRegion {
                bbox: Rect::new(72.0, 676.0, 280.0, 688.0),
                text: "second line".to_string(),
                font_size: 12.0,
            },
        ];
        let blocks = merge_blocks(lines);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "first line second line");
        assert_eq!(blocks[0].font_size, DEFAULT_FONT_SIZE);
        assert_eq!(blocks[0].bbox, Rect::new(72.0, 676.0, 300.0, 702.0));
    }

    #[test]
    fn separated_lines_stay_separate_blocks() {
        let lines = vec![
            TextRegion {
                bbox: Rect::new(72.0, 690.0, 300.0, 702.0),
                text: "heading".to_string(),
                font_size: 12.0,
            },
            TextRegion {
                bbox: Rect::new(72.0, 500.0, 280.0, 512.0),
                text: "body".to_string(),
                font_size: 12.0,
            },
        ];
        let blocks = merge_blocks(lines);
        assert_eq!(blocks.len(), 2);
    }
}
