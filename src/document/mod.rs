//! Document loading.
//!
//! A [`Document`] validates the header and the page table up front and keeps
//! the input buffer alive for the run. Page content is never decoded here;
//! [`PageHandle`]s give on-demand access by index.

mod page;

pub use page::{MediaBox, PageHandle};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use lopdf::{Document as LopdfDocument, ObjectId};
use serde::{Deserialize, Serialize};

use crate::detect::{self, PdfHeader};
use crate::error::{Error, Result};

/// Opaque identifier of a document's source (upload name, path, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create a source id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new("memory")
    }
}

/// A loaded, immutable PDF document.
pub struct Document {
    id: SourceId,
    source: Arc<[u8]>,
    header: PdfHeader,
    pdf: LopdfDocument,
    page_ids: Vec<ObjectId>,
}

impl Document {
    /// Load a document from bytes.
    pub fn load(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        Self::load_with_id(data, SourceId::default())
    }

    /// Load a document from bytes, tagging it with a source id.
    pub fn load_with_id(data: impl Into<Arc<[u8]>>, id: SourceId) -> Result<Self> {
        let source: Arc<[u8]> = data.into();
        let header = detect::sniff(&source)?;
        if !header.has_eof_marker {
            log::debug!("{}: no %%EOF marker, relying on xref recovery", id);
        }

        let pdf = LopdfDocument::load_mem(&source).map_err(|e| match e {
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::from(e),
        })?;

        if pdf.is_encrypted() {
            log::warn!("{}: document is encrypted, text layers may be unreadable", id);
        }

        let page_ids: Vec<ObjectId> = pdf.get_pages().into_values().collect();
        for (index, page_id) in page_ids.iter().enumerate() {
            pdf.get_dictionary(*page_id).map_err(|e| {
                Error::InvalidDocument(format!("page {} ({:?}): {}", index + 1, page_id, e))
            })?;
        }

        log::debug!(
            "{}: loaded PDF {} with {} pages",
            id,
            header.version,
            page_ids.len()
        );

        Ok(Self {
            id,
            source,
            header,
            pdf,
            page_ids,
        })
    }

    /// Load a document from a file; the path becomes the source id.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Self::load_with_id(data, SourceId::new(path.display().to_string()))
    }

    /// Source identifier.
    pub fn id(&self) -> &SourceId {
        &self.id
    }

    /// PDF version from the header.
    pub fn version(&self) -> &str {
        &self.header.version
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Check if the document has no pages.
    pub fn is_empty(&self) -> bool {
        self.page_ids.is_empty()
    }

    /// Raw input bytes, held for the lifetime of the document.
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Page handle by 0-based index.
    pub fn page(&self, index: usize) -> Option<PageHandle<'_>> {
        self.page_ids
            .get(index)
            .map(|id| PageHandle::new(self, index, *id))
    }

    /// Page handles in document order.
    pub fn pages(&self) -> impl ExactSizeIterator<Item = PageHandle<'_>> + '_ {
        self.page_ids
            .iter()
            .enumerate()
            .map(move |(index, id)| PageHandle::new(self, index, *id))
    }

    pub(crate) fn pdf(&self) -> &LopdfDocument {
        &self.pdf
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("version", &self.header.version)
            .field("pages", &self.page_ids.len())
            .field("bytes", &self.source.len())
            .finish()
    }
}
