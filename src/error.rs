//! Error types for casetext.
//!
//! Two layers: [`Error`] is fatal for a whole run and is surfaced before any
//! page work starts; [`PageError`] belongs to a single page and is recorded in
//! that page's result slot while the rest of the document keeps going.

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for casetext operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Document-level errors. Any of these aborts the run.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading files or creating the run's temp copy.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is not recognized as PDF, DOCX or text.
    #[error("Unknown file format: expected PDF, DOCX or TXT")]
    UnknownFormat,

    /// The PDF version in the header is not supported.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// The page table could not be parsed.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// The document is encrypted.
    #[error("Document is encrypted")]
    Encrypted,

    /// Pipeline options were rejected.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The result could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Every page came back empty or failed.
    #[error("No text could be extracted from {0}")]
    NoText(String),

    /// The orchestrator itself failed to join its workers.
    #[error("Worker join error: {0}")]
    Join(String),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::InvalidDocument(err.to_string()),
        }
    }
}

/// Per-page errors. These never abort the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PageError {
    /// The page has no embedded text layer.
    #[error("Page has no embedded text")]
    NoEmbeddedText,

    /// The render tool failed.
    #[error("Render error: {0}")]
    Render(String),

    /// The render tool exceeded its time budget.
    #[error("Render timed out after {0:?}")]
    RenderTimeout(Duration),

    /// The OCR tool failed (spawn failure, nonzero exit, crash, bad output).
    #[error("OCR error: {0}")]
    Ocr(String),

    /// The OCR tool exceeded its time budget.
    #[error("OCR timed out after {0:?}")]
    OcrTimeout(Duration),

    /// A tool wrote more than the configured cap.
    #[error("{tool} output exceeded {limit} bytes")]
    OutputTooLarge {
        /// Tool that produced the output
        tool: String,
        /// Configured cap in bytes
        limit: usize,
    },

    /// The run was cancelled before this page finished.
    #[error("Cancelled")]
    Cancelled,

    /// The page task died without reporting.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PageError {
    /// Stable machine-readable kind, used in serialized results.
    pub fn kind(&self) -> FailureKind {
        match self {
            PageError::NoEmbeddedText => FailureKind::NoText,
            PageError::Render(_) => FailureKind::Render,
            PageError::RenderTimeout(_) | PageError::OcrTimeout(_) => FailureKind::Timeout,
            PageError::Ocr(_) => FailureKind::Ocr,
            PageError::OutputTooLarge { .. } => FailureKind::OutputTooLarge,
            PageError::Cancelled => FailureKind::Cancelled,
            PageError::Internal(_) => FailureKind::Internal,
        }
    }

    /// Whether this error came from run-level cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PageError::Cancelled)
    }
}

/// Category of a page failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoText,
    Render,
    Ocr,
    Timeout,
    OutputTooLarge,
    Cancelled,
    Internal,
}

/// Serializable projection of a [`PageError`] stored in a failed page slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Failure category
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
}

impl From<&PageError> for FailureReason {
    fn from(err: &PageError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<PageError> for FailureReason {
    fn from(err: PageError) -> Self {
        Self::from(&err)
    }
}
