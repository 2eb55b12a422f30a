//! Pipeline orchestration.
//!
//! A [`Pipeline`] takes a loaded [`Document`] through native extraction,
//! strategy selection and, where needed, rendering and OCR. Pages run
//! concurrently up to the configured limit and every page writes exactly
//! one slot of the ordered result.

mod options;
mod state;

pub use options::PipelineOptions;
pub use state::{BitmapGauge, BitmapLease, PageObserver, PageState};

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::detect::{self, SourceFormat};
use crate::document::{Document, SourceId};
use crate::error::{Error, PageError, Result};
use crate::native::{NativeExtractor, PageScan};
use crate::ocr::{OcrRequest, OcrText, Recognizer, Tesseract};
use crate::plain;
use crate::process::probe_version;
use crate::raster::{Pdftoppm, Rasterizer, RenderRequest};
use crate::result::{assemble, DocumentResult, ExtractionResult, PageResult, RunMetadata};
use crate::strategy::{self, Preference, Strategy};
use state::PageTracker;

/// Budget for a tool's version probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-page text extraction with OCR fallback.
#[derive(Clone)]
pub struct Pipeline {
    options: PipelineOptions,
    rasterizer: Arc<dyn Rasterizer>,
    recognizer: Arc<dyn Recognizer>,
    observer: Option<Arc<dyn PageObserver>>,
}

impl Pipeline {
    /// Create a pipeline using `pdftoppm` and `tesseract`.
    pub fn new(options: PipelineOptions) -> Result<Self> {
        let rasterizer = Arc::new(Pdftoppm::new(&options.pdftoppm_path));
        let recognizer = Arc::new(Tesseract::new(&options.tesseract_path));
        Self::with_backends(options, rasterizer, recognizer)
    }

    /// Create a pipeline with custom render and OCR backends.
    pub fn with_backends(
        options: PipelineOptions,
        rasterizer: Arc<dyn Rasterizer>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            rasterizer,
            recognizer,
            observer: None,
        })
    }

    /// Report page progress to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn PageObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Active options.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Load and process a document from bytes.
    pub async fn run(&self, data: impl Into<Arc<[u8]>>) -> Result<DocumentResult> {
        self.run_with_cancel(data, CancellationToken::new()).await
    }

    /// Load and process a document from bytes under a cancellation token.
    ///
    /// PDF and DOCX are recognized by content.
    pub async fn run_with_cancel(
        &self,
        data: impl Into<Arc<[u8]>>,
        cancel: CancellationToken,
    ) -> Result<DocumentResult> {
        self.run_source(data, None, SourceId::default(), cancel)
            .await
    }

    /// Load and process a file; the path becomes the source id and its
    /// extension helps pick the format.
    pub async fn run_file<P: AsRef<Path>>(
        &self,
        path: P,
        cancel: CancellationToken,
    ) -> Result<DocumentResult> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let extension = path.extension().and_then(|e| e.to_str());
        let id = SourceId::new(path.display().to_string());
        self.run_source(data, extension, id, cancel).await
    }

    /// Detect the format of `data` and process it.
    ///
    /// PDFs go through the page pipeline. DOCX and text sources come back
    /// as a single native-text entry.
    pub async fn run_source(
        &self,
        data: impl Into<Arc<[u8]>>,
        extension: Option<&str>,
        id: SourceId,
        cancel: CancellationToken,
    ) -> Result<DocumentResult> {
        let data: Arc<[u8]> = data.into();
        match detect::detect_format(&data, extension)? {
            SourceFormat::Pdf => {
                let doc = load_blocking(move || Document::load_with_id(data, id)).await?;
                self.process(Arc::new(doc), cancel).await
            }
            format => self.process_plain(data, format, id, cancel).await,
        }
    }

    /// Process an already loaded document.
    ///
    /// Per-page failures are recorded in the result; only the returned
    /// `Err` aborts. After cancellation, pages that already finished keep
    /// their results and the rest report [`PageError::Cancelled`].
    pub async fn process(
        &self,
        doc: Arc<Document>,
        cancel: CancellationToken,
    ) -> Result<DocumentResult> {
        let page_count = doc.page_count();
        let mut metadata = RunMetadata::started(doc.id().clone());
        log::info!(
            "{}: extracting {} pages (concurrency {})",
            doc.id(),
            page_count,
            self.options.concurrency
        );

        let run = Arc::new(PipelineRun {
            doc,
            options: self.options.clone(),
            extractor: NativeExtractor::new(self.options.strategy.full_page_chars),
            rasterizer: Arc::clone(&self.rasterizer),
            recognizer: Arc::clone(&self.recognizer),
            observer: self.observer.clone(),
            gauge: Arc::new(BitmapGauge::new()),
            spill: OnceCell::new(),
            cancel: cancel.clone(),
        });

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let mut slots: Vec<Option<PageResult>> = vec![None; page_count];
        let mut tasks = JoinSet::new();

        for index in 0..page_count {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                // Never admitted; no work was started for this page.
                let tracker = PageTracker::new(index, run.observer.clone());
                slots[index] = Some(tracker.finish(PageResult::failed(index, &PageError::Cancelled)));
                continue;
            };

            let run = Arc::clone(&run);
            tasks.spawn(async move {
                let result = run.process_page(index).await;
                drop(permit);
                result
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    let index = result.index;
                    match slots.get_mut(index) {
                        Some(slot @ None) => *slot = Some(result),
                        Some(Some(_)) => log::error!("page {}: result written twice", index + 1),
                        None => log::error!("page {}: result out of range", index + 1),
                    }
                }
                Err(e) => log::error!("{}: page task failed: {}", run.doc.id(), e),
            }
        }

        let pages: Vec<PageResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    PageResult::failed(
                        index,
                        &PageError::Internal("page task ended without a result".into()),
                    )
                })
            })
            .collect();

        metadata.finished_at = Utc::now();
        metadata.cancelled = cancel.is_cancelled();
        let result = assemble(pages, metadata, run.gauge.peak());

        log::info!(
            "{}: done in {} ms ({} native, {} ocr, {} failed)",
            result.metadata.source,
            result.metadata.duration_ms(),
            result.stats.native_pages,
            result.stats.ocr_pages,
            result.stats.failed_pages
        );
        Ok(result)
    }

    /// One-entry result for a source without pages.
    async fn process_plain(
        &self,
        data: Arc<[u8]>,
        format: SourceFormat,
        id: SourceId,
        cancel: CancellationToken,
    ) -> Result<DocumentResult> {
        let started = Instant::now();
        let mut metadata = RunMetadata::started(id);
        log::info!("{}: reading {} text", metadata.source, format);

        let text = tokio::task::spawn_blocking(move || plain::extract(&data, format))
            .await
            .map_err(|e| Error::Join(e.to_string()))??;

        let mut tracker = PageTracker::new(0, self.observer.clone());
        let page = if cancel.is_cancelled() {
            PageResult::failed(0, &PageError::Cancelled)
        } else {
            tracker.advance(PageState::Extracting);
            tracker.advance(PageState::NativeDone);
            let mut page = PageResult::new(0, ExtractionResult::NativeText { text, density: 1.0 });
            page.strategy = Some(Strategy::NativeOnly);
            page.elapsed_ms = started.elapsed().as_millis() as u64;
            page
        };
        let page = tracker.finish(page);

        metadata.finished_at = Utc::now();
        metadata.cancelled = cancel.is_cancelled();
        Ok(assemble(vec![page], metadata, 0))
    }

    /// Probe the configured external tools.
    pub async fn check_tools(&self) -> Vec<ToolStatus> {
        let (pdftoppm, tesseract) = tokio::join!(
            probe_version(&self.options.pdftoppm_path, "-v", PROBE_TIMEOUT),
            probe_version(&self.options.tesseract_path, "--version", PROBE_TIMEOUT),
        );
        vec![
            ToolStatus {
                name: "pdftoppm".to_string(),
                path: self.options.pdftoppm_path.clone(),
                version: pdftoppm,
            },
            ToolStatus {
                name: "tesseract".to_string(),
                path: self.options.tesseract_path.clone(),
                version: tesseract,
            },
        ]
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .field("rasterizer", &self.rasterizer.name())
            .field("recognizer", &self.recognizer.name())
            .finish()
    }
}

/// Availability of one external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStatus {
    /// Tool name
    pub name: String,
    /// Configured executable
    pub path: PathBuf,
    /// First line of its version output, if it ran
    pub version: Option<String>,
}

impl ToolStatus {
    /// Whether the tool answered its version probe.
    pub fn is_available(&self) -> bool {
        self.version.is_some()
    }
}

async fn load_blocking<F>(load: F) -> Result<Document>
where
    F: FnOnce() -> Result<Document> + Send + 'static,
{
    tokio::task::spawn_blocking(load)
        .await
        .map_err(|e| Error::Join(e.to_string()))?
}

/// State shared by the page tasks of one run.
///
/// Dropping it removes the on-disk copy of the source.
struct PipelineRun {
    doc: Arc<Document>,
    options: PipelineOptions,
    extractor: NativeExtractor,
    rasterizer: Arc<dyn Rasterizer>,
    recognizer: Arc<dyn Recognizer>,
    observer: Option<Arc<dyn PageObserver>>,
    gauge: Arc<BitmapGauge>,
    spill: OnceCell<TempPath>,
    cancel: CancellationToken,
}

impl PipelineRun {
    async fn process_page(self: Arc<Self>, index: usize) -> PageResult {
        let started = Instant::now();
        let mut tracker = PageTracker::new(index, self.observer.clone());

        if self.cancel.is_cancelled() {
            return tracker.finish(PageResult::failed(index, &PageError::Cancelled));
        }
        tracker.advance(PageState::Extracting);

        let scan = match self.scan(index).await {
            Ok(scan) => scan,
            Err(e) => return tracker.finish(self.page_failed(index, e)),
        };

        let strategy = strategy::select(&scan, &self.options.strategy);
        log::debug!(
            "page {}: {} chars, density {:.3} -> {}",
            index + 1,
            scan.chars,
            scan.density,
            strategy
        );

        let mut rasterized = false;
        let outcome = match strategy {
            Strategy::NativeOnly => {
                tracker.advance(PageState::NativeDone);
                ExtractionResult::NativeText {
                    text: scan.text,
                    density: scan.density,
                }
            }
            Strategy::OcrFallback => {
                tracker.advance(PageState::Rasterizing);
                match self.ocr(index, &mut tracker, &mut rasterized).await {
                    Ok(ocr) => ExtractionResult::OcrText {
                        text: ocr.text,
                        confidence: ocr.confidence,
                    },
                    Err(e) => self.page_failed(index, e).outcome,
                }
            }
            Strategy::Both => {
                tracker.advance(PageState::NativeDone);
                tracker.advance(PageState::Rasterizing);
                let ocr = self.ocr(index, &mut tracker, &mut rasterized).await;
                self.settle_both(index, scan, ocr)
            }
        };

        let mut result = PageResult::new(index, outcome);
        result.strategy = Some(strategy);
        result.rasterized = rasterized;
        result.elapsed_ms = started.elapsed().as_millis() as u64;
        tracker.finish(result)
    }

    /// Native scan on the blocking pool.
    async fn scan(&self, index: usize) -> std::result::Result<PageScan, PageError> {
        let doc = Arc::clone(&self.doc);
        let extractor = self.extractor;
        let handle =
            tokio::task::spawn_blocking(move || doc.page(index).map(|page| extractor.scan(&page)));

        self.or_cancel(async {
            match handle.await {
                Ok(Some(scan)) => Ok(scan),
                Ok(None) => Err(PageError::Internal(format!("no page at index {}", index))),
                Err(e) => Err(PageError::Internal(format!("native extraction failed: {}", e))),
            }
        })
        .await
    }

    /// Render the page and recognize it. The bitmap is released before
    /// returning.
    async fn ocr(
        &self,
        index: usize,
        tracker: &mut PageTracker,
        rasterized: &mut bool,
    ) -> std::result::Result<OcrText, PageError> {
        let source = self.source_path().await?;
        let page = self
            .doc
            .page(index)
            .ok_or_else(|| PageError::Internal(format!("no page at index {}", index)))?;

        let request = RenderRequest {
            page,
            source,
            dpi: self.options.dpi,
            limits: self.options.render_limits(),
            cancel: &self.cancel,
        };
        let timeout = self.options.render_timeout;
        let render = async {
            tokio::time::timeout(timeout, self.rasterizer.rasterize(request))
                .await
                .unwrap_or(Err(PageError::RenderTimeout(timeout)))
        };
        let bitmap = self.gauge.lease(self.or_cancel(render).await?);
        *rasterized = true;

        tracker.advance(PageState::OcrRunning);
        let request = OcrRequest {
            page_number: page.number(),
            language: &self.options.language,
            limits: self.options.ocr_limits(),
            cancel: &self.cancel,
        };
        let timeout = self.options.ocr_timeout;
        let recognize = async {
            tokio::time::timeout(timeout, self.recognizer.recognize(&bitmap, request))
                .await
                .unwrap_or(Err(PageError::OcrTimeout(timeout)))
        };
        let result = self.or_cancel(recognize).await;
        drop(bitmap);
        result
    }

    /// Pick between native text and OCR for a borderline page.
    fn settle_both(
        &self,
        index: usize,
        scan: PageScan,
        ocr: std::result::Result<OcrText, PageError>,
    ) -> ExtractionResult {
        match ocr {
            Ok(ocr) => match strategy::prefer(&scan, &ocr, &self.options.strategy) {
                Preference::Ocr => ExtractionResult::OcrText {
                    text: ocr.text,
                    confidence: ocr.confidence,
                },
                Preference::Native => ExtractionResult::NativeText {
                    text: scan.text,
                    density: scan.density,
                },
            },
            Err(PageError::Cancelled) => ExtractionResult::failed(&PageError::Cancelled),
            Err(e) => {
                log::warn!("page {}: OCR failed, keeping native text: {}", index + 1, e);
                ExtractionResult::NativeText {
                    text: scan.text,
                    density: scan.density,
                }
            }
        }
    }

    fn page_failed(&self, index: usize, err: PageError) -> PageResult {
        if !err.is_cancelled() {
            log::warn!("{}: page {} failed: {}", self.doc.id(), index + 1, err);
        }
        PageResult::failed(index, &err)
    }

    /// On-disk copy of the source, written on first use.
    async fn source_path(&self) -> std::result::Result<&Path, PageError> {
        let path = self
            .spill
            .get_or_try_init(|| async {
                let doc = Arc::clone(&self.doc);
                tokio::task::spawn_blocking(move || spill(doc.source()))
                    .await
                    .map_err(|e| PageError::Internal(e.to_string()))?
                    .map_err(|e| PageError::Render(format!("cannot stage source for rendering: {}", e)))
            })
            .await?;
        Ok(&**path)
    }

    async fn or_cancel<T, F>(&self, fut: F) -> std::result::Result<T, PageError>
    where
        F: Future<Output = std::result::Result<T, PageError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PageError::Cancelled),
            result = fut => result,
        }
    }
}

fn spill(data: &[u8]) -> std::io::Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("casetext-")
        .suffix(".pdf")
        .tempfile()?;
    file.write_all(data)?;
    file.flush()?;
    Ok(file.into_temp_path())
}
