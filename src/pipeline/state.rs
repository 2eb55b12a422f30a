//! Per-page lifecycle and bitmap accounting.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::raster::Bitmap;
use crate::result::PageResult;

/// Where a page is in its extraction.
///
/// The main path is `Pending -> Extracting -> (NativeDone | Rasterizing)
/// -> (Complete | OcrRunning -> Complete)`, and any non-terminal state may
/// move to `Failed`. Borderline pages that run both extractions add two
/// edges: `NativeDone -> Rasterizing` when OCR starts after the native
/// text is kept, and `Rasterizing -> Complete` when rendering fails and
/// the native text stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Pending,
    Extracting,
    NativeDone,
    Rasterizing,
    OcrRunning,
    Complete,
    Failed,
}

impl PageState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: PageState) -> bool {
        use PageState::*;
        matches!(
            (self, next),
            (Pending, Extracting)
                | (Extracting, NativeDone)
                | (Extracting, Rasterizing)
                | (NativeDone, Complete)
                | (NativeDone, Rasterizing)
                | (Rasterizing, OcrRunning)
                | (Rasterizing, Complete)
                | (OcrRunning, Complete)
        ) || (next == Failed && !self.is_terminal())
    }

    /// `Complete` and `Failed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, PageState::Complete | PageState::Failed)
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageState::Pending => "pending",
            PageState::Extracting => "extracting",
            PageState::NativeDone => "native_done",
            PageState::Rasterizing => "rasterizing",
            PageState::OcrRunning => "ocr_running",
            PageState::Complete => "complete",
            PageState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Receives page progress from a running pipeline.
///
/// Called from worker tasks; implementations must be cheap and must not
/// block.
pub trait PageObserver: Send + Sync {
    /// A page moved between states.
    fn on_transition(&self, _index: usize, _from: PageState, _to: PageState) {}

    /// A page's result is final.
    fn on_page_done(&self, _result: &PageResult) {}
}

/// Drives one page through [`PageState`], reporting to the observer.
pub(crate) struct PageTracker {
    index: usize,
    state: PageState,
    observer: Option<Arc<dyn PageObserver>>,
}

impl PageTracker {
    pub(crate) fn new(index: usize, observer: Option<Arc<dyn PageObserver>>) -> Self {
        Self {
            index,
            state: PageState::Pending,
            observer,
        }
    }

    pub(crate) fn state(&self) -> PageState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: PageState) {
        let from = self.state;
        if !from.can_advance_to(next) {
            debug_assert!(false, "page {}: illegal transition {} -> {}", self.index, from, next);
            log::error!("page {}: illegal transition {} -> {}", self.index + 1, from, next);
            return;
        }
        log::debug!("page {}: {} -> {}", self.index + 1, from, next);
        self.state = next;
        if let Some(observer) = &self.observer {
            observer.on_transition(self.index, from, next);
        }
    }

    /// Move to the terminal state matching `result` and report it.
    pub(crate) fn finish(mut self, result: PageResult) -> PageResult {
        let terminal = if result.outcome.is_failed() {
            PageState::Failed
        } else {
            PageState::Complete
        };
        if self.state != terminal {
            self.advance(terminal);
        }
        if let Some(observer) = &self.observer {
            observer.on_page_done(&result);
        }
        result
    }
}

/// Counts rendered pages alive at once.
#[derive(Debug, Default)]
pub struct BitmapGauge {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl BitmapGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a bitmap for the duration of its OCR step.
    pub fn lease(self: &Arc<Self>, bitmap: Bitmap) -> BitmapLease {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        BitmapLease {
            bitmap,
            gauge: Arc::clone(self),
        }
    }

    /// Bitmaps currently alive.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Most bitmaps ever alive at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A bitmap counted by a [`BitmapGauge`]; released on drop.
pub struct BitmapLease {
    bitmap: Bitmap,
    gauge: Arc<BitmapGauge>,
}

impl Deref for BitmapLease {
    type Target = Bitmap;

    fn deref(&self) -> &Bitmap {
        &self.bitmap
    }
}

impl Drop for BitmapLease {
    fn drop(&mut self) {
        self.gauge.live.fetch_sub(1, Ordering::SeqCst);
    }
}
