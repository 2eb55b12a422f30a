//! Page handles.

use lopdf::{Dictionary, Object, ObjectId};
use serde::{Deserialize, Serialize};

use super::Document;

/// US Letter, the fallback when no `MediaBox` is found.
const LETTER: MediaBox = MediaBox {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// Guard against malformed `Parent` cycles.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Page boundaries in points (1 point = 1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl MediaBox {
    /// US Letter (8.5 x 11 inches).
    pub fn letter() -> Self {
        LETTER
    }

    /// Width in points.
    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).abs()
    }

    /// Height in points.
    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).abs()
    }

    /// Area in square points.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Pixel dimensions when rendered at `dpi`.
    pub fn pixels_at(&self, dpi: u32) -> (u32, u32) {
        let scale = dpi as f32 / 72.0;
        (
            (self.width() * scale).ceil() as u32,
            (self.height() * scale).ceil() as u32,
        )
    }

    fn from_object(obj: &Object) -> Option<Self> {
        let array = obj.as_array().ok()?;
        if array.len() < 4 {
            return None;
        }
        let coord = |i: usize| -> Option<f32> {
            match &array[i] {
                Object::Integer(v) => Some(*v as f32),
                Object::Real(v) => Some(*v),
                _ => None,
            }
        };
        let bbox = Self {
            x0: coord(0)?,
            y0: coord(1)?,
            x1: coord(2)?,
            y1: coord(3)?,
        };
        (bbox.area() > 0.0).then_some(bbox)
    }
}

/// Borrowed handle to one page of a [`Document`].
#[derive(Clone, Copy)]
pub struct PageHandle<'a> {
    doc: &'a Document,
    index: usize,
    id: ObjectId,
}

impl<'a> PageHandle<'a> {
    pub(super) fn new(doc: &'a Document, index: usize, id: ObjectId) -> Self {
        Self { doc, index, id }
    }

    /// 0-based index in document order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based page number, as external tools count pages.
    pub fn number(&self) -> u32 {
        self.index as u32 + 1
    }

    /// PDF object id of the page dictionary.
    pub fn object_id(&self) -> ObjectId {
        self.id
    }

    /// Owning document.
    pub fn document(&self) -> &'a Document {
        self.doc
    }

    /// The page's `MediaBox`, following `Parent` inheritance.
    pub fn media_box(&self) -> MediaBox {
        let pdf = self.doc.pdf();
        let mut current = pdf.get_dictionary(self.id).ok();

        for _ in 0..MAX_INHERITANCE_DEPTH {
            let Some(dict) = current else { break };
            if let Some(bbox) = lookup(pdf, dict, b"MediaBox").and_then(MediaBox::from_object) {
                return bbox;
            }
            current = dict
                .get(b"Parent")
                .ok()
                .and_then(|p| p.as_reference().ok())
                .and_then(|id| pdf.get_dictionary(id).ok());
        }

        LETTER
    }

    /// Decompressed content stream bytes (all streams concatenated).
    pub fn content(&self) -> lopdf::Result<Vec<u8>> {
        self.doc.pdf().get_page_content(self.id)
    }
}

impl std::fmt::Debug for PageHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("index", &self.index)
            .field("id", &self.id)
            .finish()
    }
}

/// Fetch `key` from `dict`, resolving one level of indirection.
fn lookup<'d>(pdf: &'d lopdf::Document, dict: &'d Dictionary, key: &[u8]) -> Option<&'d Object> {
    match dict.get(key).ok()? {
        Object::Reference(id) => pdf.get_object(*id).ok(),
        obj => Some(obj),
    }
}
