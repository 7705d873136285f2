//! Minimal text-run interpreter over page content streams.
//!
//! Walks the text-positioning and text-showing operators (`BT`/`ET`, `Tf`,
//! `Td`/`TD`/`Tm`/`T*`/`TL`, `Tj`/`TJ`/`'`/`"`) and harvests one positioned
//! span per show operator. Graphics-state operators outside the text object
//! are ignored, so positions assume the default CTM; that covers ordinary
//! body text, and the coarser extraction tiers pick up what this misses.
//!
//! Show strings are decoded per the requested [`DecodeMode`]: against the
//! page's font encodings, or with a byte-level guess for pages whose fonts
//! resist encoding resolution.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use lopdf::content::Content;
use lopdf::{Document, Encoding, Object, ObjectId};

use super::font::OverlayFont;
use super::number;

/// A run of shown text anchored at its baseline start point.
#[derive(Debug, Clone)]
pub struct TextSpan {
    /// Baseline start, page space.
    pub x: f32,
    pub y: f32,
    pub text: String,
    pub font_size: f32,
}

/// How show-string bytes become text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Decode with the encoding of the font selected by `Tf`, resolved from
    /// the page's font dictionaries. Strings whose font has no resolvable
    /// encoding are dropped.
    FontEncodings,
    /// Byte-level guess: UTF-16BE when BOM-prefixed, Latin-1 otherwise.
    /// Used by the coarse tier when encoding resolution yields nothing.
    Lenient,
}

#[derive(Debug, Clone, Copy)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    fn translation(tx: f32, ty: f32) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::identity()
        }
    }

    /// self × other, row-vector convention as in the PDF spec.
    fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn vertical_scale(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

struct TextState {
    text_matrix: Matrix,
    line_matrix: Matrix,
    font_size: f32,
    leading: f32,
}

impl TextState {
    fn new() -> Self {
        Self {
            text_matrix: Matrix::identity(),
            line_matrix: Matrix::identity(),
            font_size: 0.0,
            leading: 0.0,
        }
    }

    fn begin_text(&mut self) {
        self.text_matrix = Matrix::identity();
        self.line_matrix = Matrix::identity();
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translation(tx, ty).multiply(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn effective_size(&self) -> f32 {
        let size = self.font_size * self.text_matrix.vertical_scale();
        if size > 0.0 { size } else { 12.0 }
    }
}

/// Extract all decodable text spans from one page's content streams.
/// `font` measures pen advances for consecutive shows on one line.
pub fn extract_spans(
    doc: &Document,
    page_id: ObjectId,
    font: &OverlayFont,
    mode: DecodeMode,
) -> Result<Vec<TextSpan>> {
    let data = doc
        .get_page_content(page_id)
        .map_err(|err| anyhow!("failed to read page content: {}", err))?;
    let content = Content::decode(&data)
        .map_err(|err| anyhow!("failed to decode page content: {}", err))?;

    // Resolve one encoding per font resource up front, the way lopdf's own
    // text extraction does. Fonts that fail to resolve are simply absent.
    let encodings: BTreeMap<Vec<u8>, Encoding> = if mode == DecodeMode::FontEncodings {
        doc.get_page_fonts(page_id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(name, font_dict)| {
                font_dict
                    .get_font_encoding(doc)
                    .ok()
                    .map(|encoding| (name, encoding))
            })
            .collect()
    } else {
        BTreeMap::new()
    };

    let mut current_encoding: Option<&Encoding> = None;
    let mut state = TextState::new();
    let mut spans = Vec::new();

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "BT" => state.begin_text(),
            "Tf" => {
                if let Some(name) = operands.first().and_then(|operand| operand.as_name().ok()) {
                    current_encoding = encodings.get(name);
                }
                if let Some(size) = operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    state.leading = leading;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    state.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    state.leading = -ty;
                    state.move_line(tx, ty);
                }
            }
            "Tm" => {
                let values: Vec<f32> = operands.iter().filter_map(number).collect();
                if values.len() == 6 {
                    state.line_matrix = Matrix {
                        a: values[0],
                        b: values[1],
                        c: values[2],
                        d: values[3],
                        e: values[4],
                        f: values[5],
                    };
                    state.text_matrix = state.line_matrix;
                }
            }
            "T*" => state.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    if let Some(text) = decode_bytes(mode, current_encoding, bytes) {
                        push_span(&mut spans, &mut state, font, text);
                    }
                }
            }
            "'" => {
                state.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    if let Some(text) = decode_bytes(mode, current_encoding, bytes) {
                        push_span(&mut spans, &mut state, font, text);
                    }
                }
            }
            "\"" => {
                state.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    if let Some(text) = decode_bytes(mode, current_encoding, bytes) {
                        push_span(&mut spans, &mut state, font, text);
                    }
                }
            }
            "TJ" => {
                if let Some(Object::Array(elements)) = operands.first() {
                    let mut combined = String::new();
                    for element in elements {
                        if let Object::String(bytes, _) = element {
                            if let Some(text) = decode_bytes(mode, current_encoding, bytes) {
                                combined.push_str(&text);
                            }
                        }
                    }
                    push_span(&mut spans, &mut state, font, combined);
                }
            }
            _ => {}
        }
    }

    Ok(spans)
}

fn push_span(spans: &mut Vec<TextSpan>, state: &mut TextState, font: &OverlayFont, text: String) {
    if text.trim().is_empty() || !is_mostly_printable(&text) {
        return;
    }
    let size = state.effective_size();
    let span = TextSpan {
        x: state.text_matrix.e,
        y: state.text_matrix.f,
        text,
        font_size: size,
    };
    // Advance the pen by the measured width so consecutive shows on one
    // line land at increasing x positions.
    let advance = font.text_width(&span.text, size);
    state.text_matrix.e += advance;
    spans.push(span);
}

fn decode_bytes(mode: DecodeMode, encoding: Option<&Encoding>, bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    match mode {
        DecodeMode::FontEncodings => Document::decode_text(encoding?, bytes).ok(),
        DecodeMode::Lenient => {
            if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
                let units: Vec<u16> = bytes[2..]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units).ok()
            } else {
                Some(bytes.iter().map(|&b| b as char).collect())
            }
        }
    }
}

/// Spans that decode to mostly unprintable content (raw CID glyph runs, or
/// broken ToUnicode maps) are rejected so garbage never reaches the
/// translator.
fn is_mostly_printable(text: &str) -> bool {
    let total = text.chars().count();
    if total == 0 {
        return false;
    }
    let printable = text
        .chars()
        .filter(|ch| !ch.is_control() && *ch != '\u{0}')
        .count();
    (printable as f32) / (total as f32) >= 0.6
}
