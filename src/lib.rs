//! # casetext
//!
//! Per-page PDF text extraction with OCR fallback.
//!
//! Each page is first read from its embedded text layer. Pages whose text
//! layer is too sparse are rendered with `pdftoppm` and recognized with
//! `tesseract`; the results come back as one ordered entry per page.
//!
//! ## Quick Start
//!
//! ```no_run
//! use casetext::{render, Pipeline, PipelineOptions};
//!
//! #[tokio::main]
//! async fn main() -> casetext::Result<()> {
//!     let pipeline = Pipeline::new(PipelineOptions::default())?;
//!     let data = std::fs::read("filing.pdf")?;
//!
//!     let result = pipeline.run(data).await?;
//!     for page in &result.pages {
//!         println!("page {}: {:?}", page.number, page.strategy);
//!     }
//!
//!     let text = render::to_text(&result, &render::TextOptions::default())?;
//!     println!("{}", text);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Per-page strategy**: native text, OCR, or both for borderline pages
//! - **Bounded work**: concurrency limit, per-tool timeouts and output caps
//! - **Cancellation**: completed pages are kept, the rest report cancelled
//! - **Failure isolation**: one bad page never aborts the document
//! - **DOCX and text input**: read as a single native-text entry

pub mod detect;
pub mod document;
pub mod error;
pub mod native;
pub mod ocr;
pub mod pipeline;
pub mod plain;
pub mod process;
pub mod raster;
pub mod render;
pub mod result;
pub mod strategy;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use detect::{detect_format, is_pdf_bytes, sniff, PdfHeader, SourceFormat};
pub use document::{Document, MediaBox, PageHandle, SourceId};
pub use error::{Error, FailureKind, FailureReason, PageError, Result};
pub use native::{NativeExtractor, NativeText, PageScan};
pub use ocr::{OcrRequest, OcrText, Recognizer, Tesseract};
pub use pipeline::{PageObserver, PageState, Pipeline, PipelineOptions, ToolStatus};
pub use raster::{Bitmap, Pdftoppm, Rasterizer, RenderRequest};
pub use render::{CleanupOptions, CleanupPreset, JsonFormat, TextOptions};
pub use result::{assemble, DocumentResult, ExtractionResult, PageResult, RunStats};
pub use strategy::{Strategy, StrategyOptions};
pub use tokio_util::sync::CancellationToken;

use std::path::Path;

/// Extract every page of a PDF or DOCX held in memory, with default options.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> casetext::Result<()> {
/// let data = std::fs::read("filing.pdf")?;
/// let result = casetext::extract_bytes(data).await?;
/// println!("{} pages, {} failed", result.len(), result.failure_count());
/// # Ok(())
/// # }
/// ```
pub async fn extract_bytes(data: impl Into<std::sync::Arc<[u8]>>) -> Result<DocumentResult> {
    Pipeline::new(PipelineOptions::default())?.run(data).await
}

/// Extract every page of a file, with default options.
///
/// PDFs are extracted per page; `.docx` and `.txt` files yield one entry.
/// The path becomes the result's source id.
pub async fn extract_file<P: AsRef<Path>>(path: P) -> Result<DocumentResult> {
    Pipeline::new(PipelineOptions::default())?
        .run_file(path, CancellationToken::new())
        .await
}

/// Extract a PDF, DOCX or text file and join its pages into plain text.
///
/// Fails with [`Error::NoText`] when no page yields any text, native or
/// OCR.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> casetext::Result<()> {
/// let options = casetext::TextOptions::new().with_max_chars(5000);
/// let text = casetext::extract_text("filing.pdf", &options).await?;
/// # Ok(())
/// # }
/// ```
pub async fn extract_text<P: AsRef<Path>>(path: P, options: &TextOptions) -> Result<String> {
    let result = extract_file(path).await?;
    render::to_text(result.require_text()?, options)
}

/// Native text only: scan every page without rendering or OCR.
///
/// Runs in parallel on the rayon pool.
pub fn scan_file<P: AsRef<Path>>(path: P, options: &StrategyOptions) -> Result<Vec<PageScan>> {
    let doc = Document::open(path)?;
    Ok(NativeExtractor::new(options.full_page_chars).extract_all(&doc))
}
