//! Document-level results and their assembly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::SourceId;
use crate::error::{Error, FailureKind, FailureReason, PageError, Result};
use crate::strategy::Strategy;

/// Final outcome for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionResult {
    /// Text from the embedded text layer
    #[serde(rename = "native")]
    NativeText {
        /// Extracted text
        text: String,
        /// Density that justified accepting it
        density: f32,
    },
    /// Text recognized from a rendered image
    #[serde(rename = "ocr")]
    OcrText {
        /// Recognized text
        text: String,
        /// Mean word confidence in `[0, 1]`
        confidence: f32,
    },
    /// Explicit failure marker
    Failed {
        /// Why the page failed
        reason: FailureReason,
    },
}

impl ExtractionResult {
    /// Failure marker for `err`.
    pub fn failed(err: &PageError) -> Self {
        ExtractionResult::Failed {
            reason: FailureReason::from(err),
        }
    }

    /// Page text, if the page succeeded.
    pub fn text(&self) -> Option<&str> {
        match self {
            ExtractionResult::NativeText { text, .. } | ExtractionResult::OcrText { text, .. } => {
                Some(text)
            }
            ExtractionResult::Failed { .. } => None,
        }
    }

    /// Whether the page failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, ExtractionResult::Failed { .. })
    }
}

/// One entry of a [`DocumentResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 0-based index in the source document
    pub index: usize,
    /// 1-based page number
    pub number: u32,
    /// Strategy chosen for the page, if it got that far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    /// Whether the page was rendered
    pub rasterized: bool,
    /// Final outcome
    #[serde(flatten)]
    pub outcome: ExtractionResult,
    /// Wall-clock time spent on the page
    pub elapsed_ms: u64,
}

impl PageResult {
    /// Result for page `index` with the given outcome.
    pub fn new(index: usize, outcome: ExtractionResult) -> Self {
        Self {
            index,
            number: index as u32 + 1,
            strategy: None,
            rasterized: false,
            outcome,
            elapsed_ms: 0,
        }
    }

    /// Failure result for page `index`.
    pub fn failed(index: usize, err: &PageError) -> Self {
        Self::new(index, ExtractionResult::failed(err))
    }

    /// Page text, if the page succeeded.
    pub fn text(&self) -> Option<&str> {
        self.outcome.text()
    }
}

/// Aggregate counts over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Pages in the document
    pub page_count: usize,
    /// Pages answered from the text layer (blank pages included)
    pub native_pages: usize,
    /// Pages answered by OCR
    pub ocr_pages: usize,
    /// Pages that failed, cancellations included
    pub failed_pages: usize,
    /// Failed pages whose reason is cancellation
    pub cancelled_pages: usize,
    /// Native pages with no text at all
    pub blank_pages: usize,
    /// Pages that went through the rasterizer
    pub rasterized_pages: usize,
    /// Most bitmaps alive at once during the run
    pub peak_bitmaps: usize,
}

impl RunStats {
    /// Number of failed pages.
    pub fn failure_count(&self) -> usize {
        self.failed_pages
    }

    fn count(&mut self, page: &PageResult) {
        self.page_count += 1;
        if page.rasterized {
            self.rasterized_pages += 1;
        }
        match &page.outcome {
            ExtractionResult::NativeText { text, .. } => {
                self.native_pages += 1;
                if text.is_empty() {
                    self.blank_pages += 1;
                }
            }
            ExtractionResult::OcrText { .. } => self.ocr_pages += 1,
            ExtractionResult::Failed { reason } => {
                self.failed_pages += 1;
                if reason.kind == FailureKind::Cancelled {
                    self.cancelled_pages += 1;
                }
            }
        }
    }
}

/// Run-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Source of the document
    pub source: SourceId,
    /// When processing started
    pub started_at: DateTime<Utc>,
    /// When processing finished
    pub finished_at: DateTime<Utc>,
    /// Whether the run was cancelled
    pub cancelled: bool,
}

impl RunMetadata {
    /// Metadata for a run that starts now.
    pub fn started(source: SourceId) -> Self {
        let now = Utc::now();
        Self {
            source,
            started_at: now,
            finished_at: now,
            cancelled: false,
        }
    }

    /// Run duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Ordered per-page results for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    /// Pages in document order
    pub pages: Vec<PageResult>,
    /// Aggregate counts
    pub stats: RunStats,
    /// Run metadata
    pub metadata: RunMetadata,
}

impl DocumentResult {
    /// Number of page entries.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Check if the document had no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Number of failed pages.
    pub fn failure_count(&self) -> usize {
        self.stats.failure_count()
    }

    /// Per-page texts in order; `None` marks a failed page.
    pub fn texts(&self) -> Vec<Option<&str>> {
        self.pages.iter().map(PageResult::text).collect()
    }

    /// Fail with [`Error::NoText`] when no page produced any text.
    pub fn require_text(&self) -> Result<&Self> {
        let any_text = self
            .pages
            .iter()
            .filter_map(PageResult::text)
            .any(|t| !t.trim().is_empty());
        if any_text {
            Ok(self)
        } else {
            Err(Error::NoText(self.metadata.source.to_string()))
        }
    }
}

/// Assemble ordered page results into a [`DocumentResult`].
///
/// `pages` must already be in page order; zero pages is a valid, empty
/// result.
pub fn assemble(pages: Vec<PageResult>, metadata: RunMetadata, peak_bitmaps: usize) -> DocumentResult {
    debug_assert!(
        pages.iter().enumerate().all(|(i, p)| p.index == i),
        "page results out of order"
    );

    let mut stats = RunStats {
        peak_bitmaps,
        ..Default::default()
    };
    for page in &pages {
        stats.count(page);
    }

    DocumentResult {
        pages,
        stats,
        metadata,
    }
}
