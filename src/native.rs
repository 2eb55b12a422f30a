//! Native text extraction from a page's embedded text layer.
//!
//! Walks the decoded content stream once, collecting shown text and noting
//! which painting operators occur. Nothing here renders; the result is a
//! pure function of the page bytes.

use std::collections::BTreeMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document as LopdfDocument, Object};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::document::{Document, MediaBox, PageHandle};
use crate::error::PageError;

/// Default number of non-whitespace characters on a "full" Letter page.
pub const DEFAULT_FULL_PAGE_CHARS: u32 = 2000;

/// TJ adjustments below this (thousandths of an em) read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// Baselines closer than this (text space units) count as one line.
const SAME_LINE_TOLERANCE: f32 = 0.5;

/// Operators that paint vector graphics.
const PAINT_OPERATORS: &[&str] = &["f", "F", "f*", "S", "s", "B", "B*", "b", "b*", "sh"];

/// Text recovered from a page's text layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeText {
    /// Extracted text, one line per text line
    pub text: String,
    /// Fraction of a full text page, in `[0, 1]`
    pub density: f32,
}

/// What a page's content stream does, beyond its text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMarks {
    /// Text-showing operators (`Tj`, `TJ`, `'`, `"`)
    pub text_ops: usize,
    /// XObject and inline image operators (`Do`, `BI`)
    pub image_ops: usize,
    /// Vector painting operators
    pub paint_ops: usize,
    /// The content stream, or text shown in a font without a Unicode
    /// mapping, could not be decoded
    pub unreadable: bool,
}

/// Full native scan of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageScan {
    /// 0-based page index
    pub index: usize,
    /// Extracted text
    pub text: String,
    /// Non-whitespace character count
    pub chars: usize,
    /// Fraction of a full text page, in `[0, 1]`
    pub density: f32,
    /// Painting summary
    pub marks: PageMarks,
}

impl PageScan {
    /// Nothing is drawn on the page at all.
    pub fn is_blank(&self) -> bool {
        self.chars == 0
            && self.marks.image_ops == 0
            && self.marks.paint_ops == 0
            && !self.marks.unreadable
    }

    /// Convert into a [`NativeText`], failing when there is no text layer.
    pub fn into_native(self) -> Result<NativeText, PageError> {
        if self.chars == 0 {
            return Err(PageError::NoEmbeddedText);
        }
        Ok(NativeText {
            text: self.text,
            density: self.density,
        })
    }
}

/// Extracts embedded text and computes its density.
#[derive(Debug, Clone, Copy)]
pub struct NativeExtractor {
    full_page_chars: u32,
}

impl NativeExtractor {
    /// Create an extractor with the given full-page reference.
    pub fn new(full_page_chars: u32) -> Self {
        Self {
            full_page_chars: full_page_chars.max(1),
        }
    }

    /// Extract text, failing with [`PageError::NoEmbeddedText`] when empty.
    pub fn extract(&self, page: &PageHandle<'_>) -> Result<NativeText, PageError> {
        self.scan(page).into_native()
    }

    /// Scan a page's content stream.
    pub fn scan(&self, page: &PageHandle<'_>) -> PageScan {
        let media_box = page.media_box();
        let mut walker = TextWalker::default();

        match page.content().map_err(|e| e.to_string()).and_then(|data| {
            Content::decode(&data).map_err(|e| e.to_string())
        }) {
            Ok(content) => {
                let pdf = page.document().pdf();
                let fonts = pdf.get_page_fonts(page.object_id()).unwrap_or_default();
                for op in &content.operations {
                    walker.apply(pdf, &fonts, &op.operator, &op.operands);
                }
            }
            Err(e) => {
                log::warn!("page {}: undecodable content stream: {}", page.number(), e);
                walker.marks.unreadable = true;
            }
        }

        let marks = walker.marks;
        let text = walker.finish();
        let chars = count_visible(&text);
        PageScan {
            index: page.index(),
            density: self.density(chars, &media_box),
            chars,
            text,
            marks,
        }
    }

    /// Scan every page in parallel, in page order.
    pub fn extract_all(&self, doc: &Document) -> Vec<PageScan> {
        (0..doc.page_count())
            .into_par_iter()
            .filter_map(|index| doc.page(index).map(|page| self.scan(&page)))
            .collect()
    }

    /// `chars` as a fraction of a full page of the same area.
    pub fn density(&self, chars: usize, media_box: &MediaBox) -> f32 {
        let letter = MediaBox::letter().area();
        let expected = self.full_page_chars as f32 * (media_box.area() / letter);
        if expected <= 0.0 {
            return 0.0;
        }
        (chars as f32 / expected).clamp(0.0, 1.0)
    }
}

impl Default for NativeExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_FULL_PAGE_CHARS)
    }
}

#[derive(Default)]
struct TextWalker {
    out: String,
    font: Vec<u8>,
    /// Baseline set by the last `Tm`, until a relative move invalidates it
    line_y: Option<f32>,
    marks: PageMarks,
}

impl TextWalker {
    fn apply(
        &mut self,
        pdf: &LopdfDocument,
        fonts: &BTreeMap<Vec<u8>, &Dictionary>,
        operator: &str,
        operands: &[Object],
    ) {
        match operator {
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.font = name.clone();
                }
            }
            "Tj" => {
                self.marks.text_ops += 1;
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(pdf, fonts, bytes);
                }
            }
            "'" | "\"" => {
                self.marks.text_ops += 1;
                self.newline();
                self.line_y = None;
                if let Some(Object::String(bytes, _)) = operands.last() {
                    self.show(pdf, fonts, bytes);
                }
            }
            "TJ" => {
                self.marks.text_ops += 1;
                if let Some(Object::Array(items)) = operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(pdf, fonts, bytes),
                            other => {
                                if number(other).is_some_and(|n| n < TJ_SPACE_THRESHOLD) {
                                    self.space();
                                }
                            }
                        }
                    }
                }
            }
            "Td" | "TD" => {
                if operands.get(1).and_then(number).is_some_and(|ty| ty != 0.0) {
                    self.newline();
                    self.line_y = None;
                } else {
                    self.space();
                }
            }
            "Tm" => {
                let ty = operands.get(5).and_then(number);
                match (self.line_y, ty) {
                    (Some(prev), Some(ty)) if (prev - ty).abs() < SAME_LINE_TOLERANCE => self.space(),
                    _ => self.newline(),
                }
                self.line_y = ty;
            }
            "T*" => {
                self.newline();
                self.line_y = None;
            }
            "BT" => self.space(),
            "Do" | "BI" => self.marks.image_ops += 1,
            op if PAINT_OPERATORS.contains(&op) => self.marks.paint_ops += 1,
            _ => {}
        }
    }

    fn show(&mut self, pdf: &LopdfDocument, fonts: &BTreeMap<Vec<u8>, &Dictionary>, bytes: &[u8]) {
        let font = fonts.get(&self.font).copied();
        if font.is_some_and(is_unmapped_composite) {
            // Glyph ids, not characters; leave the page to OCR.
            self.marks.unreadable = true;
            return;
        }

        // lopdf asserts on font dictionaries missing `/Type /Font`.
        let decoded = font
            .filter(|dict| dict.type_is(b"Font"))
            .and_then(|dict| dict.get_font_encoding(pdf).ok())
            .and_then(|enc| LopdfDocument::decode_text(&enc, bytes).ok())
            .unwrap_or_else(|| decode_text_simple(bytes));
        self.out
            .extend(decoded.chars().filter(|&c| !is_stray_control(c)));
    }

    fn space(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with(char::is_whitespace) {
            self.out.push(' ');
        }
    }

    fn newline(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn finish(self) -> String {
        self.out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn count_visible(text: &str) -> usize {
    text.chars()
        .filter(|&c| !c.is_whitespace() && !c.is_control())
        .count()
}

fn is_stray_control(c: char) -> bool {
    c.is_control() && c != '\n' && c != '\t'
}

/// A Type0 font without `ToUnicode`: its codes are CIDs with no text meaning.
fn is_unmapped_composite(font: &Dictionary) -> bool {
    font.get(b"Subtype")
        .and_then(Object::as_name)
        .is_ok_and(|subtype| subtype == b"Type0")
        && !font.has(b"ToUnicode")
}

/// Decode a string operand without font information.
///
/// UTF-16BE with BOM, then UTF-8, then Latin-1.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
