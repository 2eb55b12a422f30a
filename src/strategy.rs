//! Per-page extraction strategy.
//!
//! [`select`] is a pure function of a page's native scan and the options;
//! [`prefer`] settles the `Both` case once OCR has had its turn.

use serde::{Deserialize, Serialize};

use crate::native::{PageScan, DEFAULT_FULL_PAGE_CHARS};
use crate::ocr::OcrText;

/// Default density at or above which native text is accepted.
pub const DEFAULT_DENSITY_THRESHOLD: f32 = 0.05;

/// Default width of the band below the threshold where both paths run.
pub const DEFAULT_BORDERLINE_MARGIN: f32 = 0.02;

/// Default minimum OCR confidence for OCR to replace native text.
pub const DEFAULT_MIN_OCR_CONFIDENCE: f32 = 0.6;

/// How a page's text is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Accept the embedded text layer
    NativeOnly,
    /// Rasterize and OCR
    OcrFallback,
    /// Run both and keep the better result
    Both,
}

impl Strategy {
    /// Whether this strategy renders the page.
    pub fn needs_ocr(&self) -> bool {
        !matches!(self, Strategy::NativeOnly)
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Strategy::NativeOnly => "native",
            Strategy::OcrFallback => "ocr",
            Strategy::Both => "both",
        };
        f.write_str(name)
    }
}

/// Tunables for strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyOptions {
    /// Density at or above which native text is accepted, in `[0, 1]`
    pub threshold: f32,
    /// Band below `threshold` where both paths run; 0 disables `Both`
    pub borderline_margin: f32,
    /// Non-whitespace characters on a full Letter page
    pub full_page_chars: u32,
    /// OCR must reach this confidence to replace native text under `Both`
    pub min_ocr_confidence: f32,
}

impl StrategyOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the density threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the borderline margin.
    pub fn with_borderline_margin(mut self, margin: f32) -> Self {
        self.borderline_margin = margin;
        self
    }

    /// Set the full-page character reference.
    pub fn with_full_page_chars(mut self, chars: u32) -> Self {
        self.full_page_chars = chars;
        self
    }

    /// Set the minimum OCR confidence for overriding native text.
    pub fn with_min_ocr_confidence(mut self, confidence: f32) -> Self {
        self.min_ocr_confidence = confidence;
        self
    }
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DENSITY_THRESHOLD,
            borderline_margin: DEFAULT_BORDERLINE_MARGIN,
            full_page_chars: DEFAULT_FULL_PAGE_CHARS,
            min_ocr_confidence: DEFAULT_MIN_OCR_CONFIDENCE,
        }
    }
}

/// Decide how to extract a page.
///
/// Blank pages are accepted as empty native text, which keeps them away
/// from the rasterizer.
pub fn select(scan: &PageScan, options: &StrategyOptions) -> Strategy {
    if scan.is_blank() || scan.density >= options.threshold {
        return Strategy::NativeOnly;
    }
    let floor = options.threshold - options.borderline_margin.max(0.0);
    if scan.chars > 0 && options.borderline_margin > 0.0 && scan.density >= floor {
        return Strategy::Both;
    }
    Strategy::OcrFallback
}

/// Which result wins under [`Strategy::Both`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    Native,
    Ocr,
}

/// Settle a `Both` page: OCR wins only when confident and longer.
pub fn prefer(scan: &PageScan, ocr: &OcrText, options: &StrategyOptions) -> Preference {
    let ocr_chars = ocr.text.chars().filter(|c| !c.is_whitespace()).count();
    if ocr.confidence >= options.min_ocr_confidence && ocr_chars > scan.chars {
        Preference::Ocr
    } else {
        Preference::Native
    }
}
