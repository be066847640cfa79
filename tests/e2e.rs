//! End-to-end tests for par-ocr.
//!
//! These tests use real documents in `./test_cases/`, a local pdfium
//! library and live model APIs. They are gated behind `E2E_ENABLED` so
//! they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture
//!
//! The provider is taken from `AI_PROVIDER` (default `openai`), the model
//! from `AI_MODEL` and the endpoint from `AI_BASE_URL`.

use par_ocr::{
    fetch_source, page_images, process_document, DirectorySink, ExtractionProgress, LlmProvider,
    MemorySink, ModelConfig, OcrConfig, OcrError, OutboxOutcome, OutboxWatcher, PageImageFormat,
    PricingDisplay, RenderOptions,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Model config from the environment, or `None` when the credential is missing.
fn live_model() -> Option<ModelConfig> {
    let provider: LlmProvider = std::env::var("AI_PROVIDER")
        .unwrap_or_else(|_| "openai".into())
        .parse()
        .expect("AI_PROVIDER must name a known provider");
    if !provider.is_api_key_set() {
        println!("SKIP: no credential for provider {provider}");
        return None;
    }
    let mut builder = ModelConfig::builder(provider)
        .base_url(std::env::var("AI_BASE_URL").ok())
        .timeout_secs(Some(120));
    if let Ok(model) = std::env::var("AI_MODEL") {
        builder = builder.model_name(model);
    }
    Some(builder.build().expect("valid model config"))
}

fn live_config(model: ModelConfig) -> OcrConfig {
    OcrConfig::builder(model)
        .max_workers(Some(4))
        .pricing(PricingDisplay::Details)
        .build()
        .expect("valid config")
}

/// Basic quality checks on a merged document of `pages` pages.
fn assert_document_shape(md: &str, pages: usize, context: &str) {
    assert!(!md.trim().is_empty(), "[{context}] Markdown is empty");
    assert!(md.ends_with('\n'), "[{context}] Markdown must end with a newline");
    assert!(
        !md.lines().next().unwrap_or("").starts_with("```"),
        "[{context}] Output must not start with a code fence"
    );
    for k in 1..=pages {
        let trailer = format!("Page # {k}");
        assert_eq!(
            md.lines().filter(|l| *l == trailer).count(),
            1,
            "[{context}] expected exactly one '{trailer}' line"
        );
    }
    println!("[{context}] ✓  {} bytes, {} page trailer(s)", md.len(), pages);
}

// ── Render tests (pdfium, no LLM) ────────────────────────────────────────────

#[tokio::test]
async fn test_render_irs_form_pages() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("irs_form_1040.pdf"));

    let source = fetch_source(path.to_str().unwrap(), 30).await.expect("readable source");
    let options = RenderOptions {
        dpi: 150,
        max_rendered_pixels: 2000,
        format: PageImageFormat::Png,
    };
    let pages = page_images(&source, options).await.expect("render should succeed");

    assert_eq!(pages.len(), 2, "IRS form should have 2 pages");
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(page.page_number as usize, i + 1);
        let img = image::load_from_memory(&page.bytes).expect("valid PNG");
        assert!(img.width() <= 2000 && img.height() <= 2000);
        assert!(img.width() > 100);
    }
}

#[tokio::test]
async fn test_render_corrupt_pdf_is_fatal() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.pdf");
    std::fs::write(&path, b"%PDF-1.7\nthis is not a pdf body").unwrap();

    let source = fetch_source(path.to_str().unwrap(), 30).await.unwrap();
    let err = page_images(
        &source,
        RenderOptions {
            dpi: 72,
            max_rendered_pixels: 500,
            format: PageImageFormat::Png,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, OcrError::CorruptPdf { .. }), "got {err:?}");
}

// ── Live extraction tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_process_irs_form() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("irs_form_1040.pdf"));
    let Some(model) = live_model() else { return };
    let sink = Arc::new(MemorySink::new());

    let out = process_document(path.to_str().unwrap(), "e2e-irs", &live_config(model), sink.clone())
        .await
        .expect("processing should succeed");

    assert_eq!(out.stats.total_pages, 2);
    assert_eq!(out.stats.failed_pages, 0, "no page should fail");
    assert!(out.usage.input_tokens > 0, "should have consumed tokens");
    assert_document_shape(&out.markdown, 2, "irs_form");
    assert!(out.markdown.contains("1040"), "form number should be extracted");

    assert!(sink.get("outbox/e2e-irs/irs_form_1040-page001.md").is_some());
    assert!(sink.get("outbox/e2e-irs/irs_form_1040-page002.png").is_some());
    assert_eq!(sink.get_text(&out.final_key).as_deref(), Some(out.markdown.as_str()));

    let out_path = output_dir().join("irs_form_1040.md");
    std::fs::write(&out_path, &out.markdown).ok();
    println!(
        "[irs_form] Tokens: {} in / {} out, cost ${:.4}",
        out.usage.input_tokens, out.usage.output_tokens, out.usage.total_cost
    );
}

#[tokio::test]
async fn test_process_scanned_image() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("receipt.jpg"));
    let Some(model) = live_model() else { return };
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(DirectorySink::new(dir.path()));

    let out = process_document(path.to_str().unwrap(), "e2e-img", &live_config(model), sink)
        .await
        .expect("processing should succeed");

    assert_eq!(out.stats.total_pages, 1);
    assert_document_shape(&out.markdown, 1, "receipt");
    let on_disk = std::fs::read_to_string(dir.path().join("outbox/e2e-img/receipt-final.md")).unwrap();
    assert_eq!(on_disk, out.markdown);
}

#[tokio::test]
async fn test_progress_callbacks_fire_per_page() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("irs_form_1040.pdf"));
    let Some(model) = live_model() else { return };

    #[derive(Default)]
    struct Counting {
        started: AtomicUsize,
        completed: AtomicUsize,
        errored: AtomicUsize,
        successes: AtomicUsize,
    }

    impl ExtractionProgress for Counting {
        fn on_page_start(&self, _page: u32, _total: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_complete(&self, _page: u32, _total: usize, _len: usize) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_error(&self, _page: u32, _total: usize, _error: &str) {
            self.errored.fetch_add(1, Ordering::SeqCst);
        }
        fn on_extraction_complete(&self, _total: usize, success_count: usize) {
            self.successes.store(success_count, Ordering::SeqCst);
        }
    }

    let cb = Arc::new(Counting::default());
    let config = OcrConfig::builder(model)
        .pricing(PricingDisplay::None)
        .progress(cb.clone())
        .build()
        .unwrap();

    let out = process_document(path.to_str().unwrap(), "e2e-cb", &config, Arc::new(MemorySink::new()))
        .await
        .unwrap();

    assert_eq!(cb.started.load(Ordering::SeqCst), 2);
    assert_eq!(
        cb.completed.load(Ordering::SeqCst) + cb.errored.load(Ordering::SeqCst),
        2
    );
    assert_eq!(cb.successes.load(Ordering::SeqCst), out.stats.succeeded_pages);
}

#[tokio::test]
async fn test_outbox_picks_up_final_document() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("receipt.jpg"));
    let Some(model) = live_model() else { return };
    let sink = Arc::new(MemorySink::new());

    let out = process_document(path.to_str().unwrap(), "e2e-outbox", &live_config(model), sink.clone())
        .await
        .unwrap();

    let forward = Arc::new(MemorySink::new());
    let watcher = OutboxWatcher::new().with_forward(forward.clone());
    let mut processed = 0;
    for key in sink.keys() {
        let object = sink.get(&key).unwrap();
        if let OutboxOutcome::Processed { .. } = watcher.handle(&key, &object.content).await.unwrap() {
            processed += 1;
        }
    }
    assert_eq!(processed, 1, "only the final document is processed");
    assert_eq!(forward.keys(), vec![out.final_key]);
}

// ── Pre-flight (no network) ──────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_file_is_reported() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }
    let err = fetch_source("/definitely/not/here/scan.pdf", 5).await.unwrap_err();
    assert!(matches!(err, OcrError::FileNotFound { .. }));
    assert!(err.is_acquisition_error());
}
