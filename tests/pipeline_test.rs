//! Integration tests for the extraction pipeline.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use casetext::render::{to_json, to_text, JsonFormat, TextOptions};
use casetext::{
    CancellationToken, DocumentResult, Error, ExtractionResult, FailureKind, PageState, Pipeline,
    PipelineOptions, Strategy, StrategyOptions,
};
use common::{build_pdf, filler, FakeOcr, FakeRenderer, PageSpec, Recorder, Script};

/// Threshold 0.5 over a 100-character page keeps the arithmetic readable.
fn options() -> PipelineOptions {
    PipelineOptions::new()
        .with_concurrency(4)
        .with_strategy(
            StrategyOptions::new()
                .with_threshold(0.5)
                .with_borderline_margin(0.0)
                .with_full_page_chars(100),
        )
        .with_ocr_timeout(Duration::from_secs(10))
}

fn pipeline(
    options: PipelineOptions,
    renderer: &Arc<FakeRenderer>,
    ocr: &Arc<FakeOcr>,
) -> Pipeline {
    Pipeline::with_backends(options, renderer.clone(), ocr.clone()).unwrap()
}

fn failure_kind(result: &DocumentResult, index: usize) -> Option<FailureKind> {
    match &result.pages[index].outcome {
        ExtractionResult::Failed { reason } => Some(reason.kind),
        _ => None,
    }
}

// ==================== Mixed Documents ====================

#[tokio::test]
async fn test_dense_blank_sparse() {
    let renderer = FakeRenderer::new();
    let ocr = FakeOcr::new();
    let pdf = build_pdf(&[
        PageSpec::text(&filler(90)),
        PageSpec::blank(),
        PageSpec::text(&filler(10)),
    ]);

    let result = pipeline(options(), &renderer, &ocr).run(pdf).await.unwrap();

    let dense = filler(90);
    let ocr_text = FakeOcr::text_for(3);
    assert_eq!(
        result.texts(),
        vec![Some(dense.as_str()), Some(""), Some(ocr_text.as_str())]
    );
    assert_eq!(result.failure_count(), 0);
    assert_eq!(result.stats.native_pages, 2);
    assert_eq!(result.stats.ocr_pages, 1);
    assert_eq!(result.stats.blank_pages, 1);

    // Only the sparse page reaches the renderer.
    assert_eq!(renderer.counters.pages(), vec![3]);
    assert_eq!(ocr.counters.pages(), vec![3]);
}

#[tokio::test]
async fn test_scanned_pages_use_ocr() {
    let renderer = FakeRenderer::new();
    let ocr = FakeOcr::new();
    let pdf = build_pdf(&[PageSpec::image_only(), PageSpec::image_only()]);

    let result = pipeline(options(), &renderer, &ocr).run(pdf).await.unwrap();

    assert!(result
        .pages
        .iter()
        .all(|p| p.strategy == Some(Strategy::OcrFallback) && p.rasterized));
    assert_eq!(
        result.texts(),
        vec![Some("ocr page 1"), Some("ocr page 2")]
    );
}

#[tokio::test]
async fn test_dense_pages_never_rasterize() {
    let renderer = FakeRenderer::new();
    let ocr = FakeOcr::new();
    let pages: Vec<PageSpec> = (0..5).map(|_| PageSpec::text(&filler(80))).collect();

    let result = pipeline(options(), &renderer, &ocr)
        .run(build_pdf(&pages))
        .await
        .unwrap();

    assert_eq!(result.stats.native_pages, 5);
    assert_eq!(result.stats.rasterized_pages, 0);
    assert_eq!(result.stats.peak_bitmaps, 0);
    assert_eq!(renderer.counters.calls(), 0);
    assert_eq!(ocr.counters.calls(), 0);
}

// ==================== Failure Isolation ====================

#[tokio::test]
async fn test_ocr_failure_is_isolated() {
    let renderer = FakeRenderer::new();
    let ocr = FakeOcr::scripted([(3, Script::Fail)]);
    let pdf = build_pdf(&[
        PageSpec::text(&filler(90)),
        PageSpec::image_only(),
        PageSpec::image_only(),
        PageSpec::image_only(),
    ]);

    let result = pipeline(options(), &renderer, &ocr).run(pdf).await.unwrap();

    assert_eq!(result.len(), 4);
    assert_eq!(result.failure_count(), 1);
    assert_eq!(failure_kind(&result, 2), Some(FailureKind::Ocr));
    assert_eq!(result.pages[1].text(), Some("ocr page 2"));
    assert_eq!(result.pages[3].text(), Some("ocr page 4"));
}

#[tokio::test]
async fn test_render_failure_is_isolated() {
    let renderer = FakeRenderer::scripted([(1, Script::Fail)]);
    let ocr = FakeOcr::new();
    let pdf = build_pdf(&[PageSpec::image_only(), PageSpec::image_only()]);

    let result = pipeline(options(), &renderer, &ocr).run(pdf).await.unwrap();

    assert_eq!(failure_kind(&result, 0), Some(FailureKind::Render));
    assert!(!result.pages[0].rasterized);
    assert_eq!(result.pages[1].text(), Some("ocr page 2"));
    // OCR never saw the page that failed to render.
    assert_eq!(ocr.counters.pages(), vec![2]);
}

#[tokio::test]
async fn test_ocr_timeout_does_not_block_siblings() {
    let renderer = FakeRenderer::new();
    let ocr = FakeOcr::scripted([(2, Script::Hang)]);
    let pdf = build_pdf(&[
        PageSpec::image_only(),
        PageSpec::image_only(),
        PageSpec::image_only(),
    ]);
    let options = options().with_ocr_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let result = pipeline(options, &renderer, &ocr).run(pdf).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(failure_kind(&result, 1), Some(FailureKind::Timeout));
    assert_eq!(result.pages[0].text(), Some("ocr page 1"));
    assert_eq!(result.pages[2].text(), Some("ocr page 3"));
    assert_eq!(result.failure_count(), 1);
}

#[tokio::test]
async fn test_render_timeout() {
    let renderer = FakeRenderer::scripted([(1, Script::Hang)]);
    let ocr = FakeOcr::new();
    let pdf = build_pdf(&[PageSpec::image_only(), PageSpec::text(&filler(90))]);
    let options = options().with_render_timeout(Duration::from_millis(200));

    let result = pipeline(options, &renderer, &ocr).run(pdf).await.unwrap();

    assert_eq!(failure_kind(&result, 0), Some(FailureKind::Timeout));
    assert_eq!(result.pages[1].text(), Some(filler(90).as_str()));
}

// ==================== Ordering & Concurrency ====================

#[tokio::test]
async fn test_order_preserved_despite_completion_order() {
    // Earlier pages take longer, so they finish last.
    let scripts = (1..=8u32).map(|page| {
        let delay = Duration::from_millis(10 * u64::from(9 - page));
        (page, Script::after(delay))
    });
    let renderer = FakeRenderer::new();
    let ocr = FakeOcr::scripted(scripts);
    let pages: Vec<PageSpec> = (0..8)
        .map(|i| {
            if i % 3 == 0 {
                PageSpec::text(&filler(70))
            } else {
                PageSpec::image_only()
            }
        })
        .collect();

    let result = pipeline(options().with_concurrency(8), &renderer, &ocr)
        .run(build_pdf(&pages))
        .await
        .unwrap();

    assert_eq!(result.len(), 8);
    for (i, page) in result.pages.iter().enumerate() {
        assert_eq!(page.index, i);
        assert_eq!(page.number as usize, i + 1);
        let expected = if i % 3 == 0 {
            filler(70)
        } else {
            FakeOcr::text_for(i as u32 + 1)
        };
        assert_eq!(page.text(), Some(expected.as_str()));
    }
}

#[tokio::test]
async fn test_peak_bitmaps_bounded_by_concurrency() {
    let renderer = FakeRenderer::new();
    let scripts = (1..=10u32).map(|page| (page, Script::after(Duration::from_millis(20))));
    let ocr = FakeOcr::scripted(scripts);
    let pages: Vec<PageSpec> = (0..10).map(|_| PageSpec::image_only()).collect();

    let result = pipeline(options().with_concurrency(3), &renderer, &ocr)
        .run(build_pdf(&pages))
        .await
        .unwrap();

    assert_eq!(result.stats.ocr_pages, 10);
    assert!(result.stats.peak_bitmaps >= 1);
    assert!(result.stats.peak_bitmaps <= 3);
    assert!(ocr.counters.max_live() <= 3);
    assert!(renderer.counters.max_live() <= 3);
}

#[tokio::test]
async fn test_sequential_runs_one_page_at_a_time() {
    let renderer = FakeRenderer::new();
    let scripts = (1..=4u32).map(|page| (page, Script::after(Duration::from_millis(10))));
    let ocr = FakeOcr::scripted(scripts);
    let pages: Vec<PageSpec> = (0..4).map(|_| PageSpec::image_only()).collect();

    let result = pipeline(options().sequential(), &renderer, &ocr)
        .run(build_pdf(&pages))
        .await
        .unwrap();

    assert_eq!(result.failure_count(), 0);
    assert_eq!(result.stats.peak_bitmaps, 1);
    assert_eq!(ocr.counters.max_live(), 1);
}

// ==================== Cancellation ====================

#[tokio::test]
async fn test_cancellation_keeps_completed_pages() {
    let renderer = FakeRenderer::new();
    let ocr = FakeOcr::scripted([(2, Script::Hang), (3, Script::Hang)]);
    let recorder = Recorder::new();
    let pipeline = pipeline(
        options().with_ocr_timeout(Duration::from_secs(60)),
        &renderer,
        &ocr,
    )
    .with_observer(recorder.clone());
    let pdf = build_pdf(&[
        PageSpec::text(&filler(90)),
        PageSpec::image_only(),
        PageSpec::image_only(),
    ]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watch_ocr = ocr.clone();
    let watch_pages = recorder.clone();
    tokio::spawn(async move {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            let started = watch_ocr.started.load(std::sync::atomic::Ordering::SeqCst);
            if started == 2 && watch_pages.done() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        trigger.cancel();
    });

    let started = Instant::now();
    let result = pipeline.run_with_cancel(pdf, cancel).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(15));
    assert!(result.metadata.cancelled);
    assert_eq!(result.pages[0].text(), Some(filler(90).as_str()));
    assert_eq!(failure_kind(&result, 1), Some(FailureKind::Cancelled));
    assert_eq!(failure_kind(&result, 2), Some(FailureKind::Cancelled));
    assert_eq!(result.stats.cancelled_pages, 2);
    assert_eq!(recorder.done(), 3);

    // Hanging recognizers were dropped, not left running.
    assert_eq!(ocr.counters.live.load(std::sync::atomic::Ordering::SeqCst), 0);
}

// ==================== Observer ====================

#[tokio::test]
async fn test_observer_sees_legal_paths() {
    let renderer = FakeRenderer::new();
    let ocr = FakeOcr::scripted([(3, Script::Fail)]);
    let recorder = Recorder::new();
    let pdf = build_pdf(&[
        PageSpec::text(&filler(90)),
        PageSpec::image_only(),
        PageSpec::image_only(),
    ]);

    pipeline(options(), &renderer, &ocr)
        .with_observer(recorder.clone())
        .run(pdf)
        .await
        .unwrap();

    use PageState::*;
    assert_eq!(recorder.path(0), vec![Pending, Extracting, NativeDone, Complete]);
    assert_eq!(
        recorder.path(1),
        vec![Pending, Extracting, Rasterizing, OcrRunning, Complete]
    );
    assert_eq!(
        recorder.path(2),
        vec![Pending, Extracting, Rasterizing, OcrRunning, Failed]
    );
    for index in 0..3 {
        let path = recorder.path(index);
        assert!(path.windows(2).all(|w| w[0].can_advance_to(w[1])));
    }
    assert_eq!(recorder.done(), 3);
}

// ==================== Edge Cases ====================

#[tokio::test]
async fn test_empty_document() {
    let renderer = FakeRenderer::new();
    let ocr = FakeOcr::new();
    let result = pipeline(options(), &renderer, &ocr)
        .run(build_pdf(&[]))
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(result.stats.page_count, 0);
    assert!(matches!(result.require_text(), Err(Error::NoText(_))));
}

#[tokio::test]
async fn test_invalid_documents_fail_before_page_work() {
    let renderer = FakeRenderer::new();
    let ocr = FakeOcr::new();
    let pipeline = pipeline(options(), &renderer, &ocr);

    let not_pdf = pipeline.run(b"PK\x03\x04 a zip file".to_vec()).await;
    assert!(matches!(not_pdf, Err(Error::UnknownFormat)));

    let bad_version = pipeline.run(b"%PDF-9.1\n%%EOF".to_vec()).await;
    assert!(matches!(bad_version, Err(Error::UnsupportedVersion(_))));

    let truncated = pipeline.run(b"%PDF-1.7\n1 0 obj\n<<".to_vec()).await;
    assert!(truncated.is_err());

    assert_eq!(renderer.counters.calls(), 0);
}

#[tokio::test]
async fn test_single_page_round_trip() {
    let renderer = FakeRenderer::new();
    let ocr = FakeOcr::new();
    let pdf = build_pdf(&[PageSpec::text("Plaintiff alleges breach of contract and seeks damages of")]);

    let options = options().with_strategy(StrategyOptions::new().with_threshold(0.01));
    let result = pipeline(options, &renderer, &ocr).run(pdf).await.unwrap();

    let text = to_text(&result, &TextOptions::default()).unwrap();
    assert_eq!(text, "Plaintiff alleges breach of contract and seeks damages of");

    let json = to_json(&result, JsonFormat::Compact).unwrap();
    let parsed: DocumentResult = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.texts(), result.texts());
}
