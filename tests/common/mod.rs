//! Shared fixtures: synthetic PDFs and scripted render/OCR backends.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use casetext::{
    Bitmap, OcrRequest, OcrText, PageError, PageObserver, PageResult, PageState, Rasterizer,
    Recognizer, RenderRequest,
};

#[path = "../../src/testing.rs"]
mod testing;

pub use testing::{docx, filler, PageSpec, PdfBuilder};

/// Build a Letter-sized PDF with one page per spec.
pub fn build_pdf(pages: &[PageSpec]) -> Vec<u8> {
    pages
        .iter()
        .cloned()
        .fold(PdfBuilder::new(), PdfBuilder::page)
        .build()
}

/// How the scripted backends treat a page.
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed after `delay`
    Ok { delay: Duration },
    /// Fail immediately
    Fail,
    /// Never finish on its own
    Hang,
}

impl Script {
    pub fn ok() -> Self {
        Script::Ok {
            delay: Duration::ZERO,
        }
    }

    pub fn after(delay: Duration) -> Self {
        Script::Ok { delay }
    }
}

/// Concurrency bookkeeping shared by the mocks.
#[derive(Debug, Default)]
pub struct Counters {
    pub calls: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub pages: Mutex<Vec<u32>>,
}

impl Counters {
    fn enter(&self, page: u32) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        self.pages.lock().unwrap().push(page);
    }

    fn exit(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn pages(&self) -> Vec<u32> {
        let mut pages = self.pages.lock().unwrap().clone();
        pages.sort_unstable();
        pages
    }
}

async fn play(script: &Script) -> Result<(), PageError> {
    match script {
        Script::Ok { delay } => {
            if !delay.is_zero() {
                tokio::time::sleep(*delay).await;
            }
            Ok(())
        }
        Script::Fail => Err(PageError::Ocr("scripted failure".into())),
        Script::Hang => std::future::pending().await,
    }
}

/// Renderer that produces a small white page.
#[derive(Debug, Default)]
pub struct FakeRenderer {
    pub counters: Counters,
    scripts: HashMap<u32, Script>,
}

impl FakeRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(scripts: impl IntoIterator<Item = (u32, Script)>) -> Arc<Self> {
        Arc::new(Self {
            counters: Counters::default(),
            scripts: scripts.into_iter().collect(),
        })
    }
}

#[async_trait]
impl Rasterizer for FakeRenderer {
    fn name(&self) -> &str {
        "fake-renderer"
    }

    async fn rasterize(&self, request: RenderRequest<'_>) -> Result<Bitmap, PageError> {
        let page = request.page.number();
        self.counters.enter(page);
        let outcome = match self.scripts.get(&page) {
            Some(Script::Fail) => Err(PageError::Render("scripted render failure".into())),
            Some(script) => play(script).await,
            None => Ok(()),
        };
        self.counters.exit();
        outcome?;
        Bitmap::blank(16, 16, request.dpi)
    }
}

/// Recognizer that answers `"ocr page N"` unless scripted otherwise.
#[derive(Debug)]
pub struct FakeOcr {
    pub counters: Counters,
    pub started: AtomicUsize,
    scripts: HashMap<u32, Script>,
    confidence: f32,
}

impl FakeOcr {
    pub fn new() -> Arc<Self> {
        Self::scripted([])
    }

    pub fn scripted(scripts: impl IntoIterator<Item = (u32, Script)>) -> Arc<Self> {
        Arc::new(Self {
            counters: Counters::default(),
            started: AtomicUsize::new(0),
            scripts: scripts.into_iter().collect(),
            confidence: 0.9,
        })
    }

    pub fn text_for(page: u32) -> String {
        format!("ocr page {}", page)
    }
}

#[async_trait]
impl Recognizer for FakeOcr {
    fn name(&self) -> &str {
        "fake-ocr"
    }

    async fn recognize(&self, _bitmap: &Bitmap, request: OcrRequest<'_>) -> Result<OcrText, PageError> {
        let page = request.page_number;
        self.counters.enter(page);
        self.started.fetch_add(1, Ordering::SeqCst);

        // Release the live count even when the future is dropped mid-hang.
        struct Exit<'a>(&'a Counters);
        impl Drop for Exit<'_> {
            fn drop(&mut self) {
                self.0.exit();
            }
        }
        let _exit = Exit(&self.counters);

        if let Some(script) = self.scripts.get(&page) {
            play(script).await?;
        }
        Ok(OcrText::plain(Self::text_for(page), self.confidence))
    }
}

/// Observer recording every transition and completion.
#[derive(Debug, Default)]
pub struct Recorder {
    pub transitions: Mutex<Vec<(usize, PageState, PageState)>>,
    pub done: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    /// States visited by one page, starting from `Pending`.
    pub fn path(&self, index: usize) -> Vec<PageState> {
        let transitions = self.transitions.lock().unwrap();
        let mut path = vec![PageState::Pending];
        path.extend(
            transitions
                .iter()
                .filter(|(i, _, _)| *i == index)
                .map(|(_, _, to)| *to),
        );
        path
    }
}

impl PageObserver for Recorder {
    fn on_transition(&self, index: usize, from: PageState, to: PageState) {
        self.transitions.lock().unwrap().push((index, from, to));
    }

    fn on_page_done(&self, _result: &PageResult) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }
}
