//! Pipeline options and configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ocr::{validate_language, DEFAULT_LANGUAGE};
use crate::process::ProcessLimits;
use crate::raster::DEFAULT_DPI;
use crate::strategy::StrategyOptions;

/// Highest accepted rendering resolution.
const MAX_DPI: u32 = 1200;

/// Options for a [`Pipeline`](super::Pipeline).
///
/// Deserializable from JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Rendering resolution for OCR
    pub dpi: u32,

    /// Strategy selection tunables
    pub strategy: StrategyOptions,

    /// Wall-clock budget for one OCR invocation
    #[serde(rename = "ocr_timeout_secs", with = "secs")]
    pub ocr_timeout: Duration,

    /// Wall-clock budget for rendering one page
    #[serde(rename = "render_timeout_secs", with = "secs")]
    pub render_timeout: Duration,

    /// Maximum bytes accepted from the OCR tool
    pub max_ocr_output_bytes: usize,

    /// Maximum encoded size of one rendered page
    pub max_bitmap_bytes: usize,

    /// Pages processed at once
    pub concurrency: usize,

    /// OCR language hint (`eng`, `eng+hin`, ...)
    pub language: String,

    /// `pdftoppm` executable
    pub pdftoppm_path: PathBuf,

    /// `tesseract` executable
    pub tesseract_path: PathBuf,
}

impl PipelineOptions {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read options from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Set the rendering resolution.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Set the strategy tunables.
    pub fn with_strategy(mut self, strategy: StrategyOptions) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the density threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.strategy.threshold = threshold;
        self
    }

    /// Set the OCR timeout.
    pub fn with_ocr_timeout(mut self, timeout: Duration) -> Self {
        self.ocr_timeout = timeout;
        self
    }

    /// Set the render timeout.
    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    /// Set the OCR output cap.
    pub fn with_max_ocr_output_bytes(mut self, bytes: usize) -> Self {
        self.max_ocr_output_bytes = bytes;
        self
    }

    /// Set the rendered page size cap.
    pub fn with_max_bitmap_bytes(mut self, bytes: usize) -> Self {
        self.max_bitmap_bytes = bytes;
        self
    }

    /// Set the concurrency limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Process one page at a time.
    pub fn sequential(mut self) -> Self {
        self.concurrency = 1;
        self
    }

    /// Set the OCR language hint.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the `pdftoppm` executable.
    pub fn with_pdftoppm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pdftoppm_path = path.into();
        self
    }

    /// Set the `tesseract` executable.
    pub fn with_tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tesseract_path = path.into();
        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.dpi == 0 || self.dpi > MAX_DPI {
            return Err(Error::Config(format!(
                "dpi must be between 1 and {}, got {}",
                MAX_DPI, self.dpi
            )));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        if self.ocr_timeout.is_zero() || self.render_timeout.is_zero() {
            return Err(Error::Config("timeouts must be non-zero".into()));
        }
        if self.max_ocr_output_bytes == 0 || self.max_bitmap_bytes == 0 {
            return Err(Error::Config("output caps must be non-zero".into()));
        }

        let s = &self.strategy;
        for (name, value) in [
            ("threshold", s.threshold),
            ("borderline_margin", s.borderline_margin),
            ("min_ocr_confidence", s.min_ocr_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if s.full_page_chars == 0 {
            return Err(Error::Config("full_page_chars must be at least 1".into()));
        }

        validate_language(&self.language).map_err(Error::Config)
    }

    pub(crate) fn render_limits(&self) -> ProcessLimits {
        ProcessLimits {
            timeout: self.render_timeout,
            max_output_bytes: self.max_bitmap_bytes,
        }
    }

    pub(crate) fn ocr_limits(&self) -> ProcessLimits {
        ProcessLimits {
            timeout: self.ocr_timeout,
            max_output_bytes: self.max_ocr_output_bytes,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            strategy: StrategyOptions::default(),
            ocr_timeout: Duration::from_secs(120),
            render_timeout: Duration::from_secs(60),
            max_ocr_output_bytes: 4 * 1024 * 1024,
            max_bitmap_bytes: 64 * 1024 * 1024,
            concurrency: default_concurrency(),
            language: DEFAULT_LANGUAGE.to_string(),
            pdftoppm_path: PathBuf::from("pdftoppm"),
            tesseract_path: PathBuf::from("tesseract"),
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Durations as fractional seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
