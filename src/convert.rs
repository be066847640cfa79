//! Orchestrator: one request from source locator to published document.
//!
//! ```text
//! preflight ─▶ fetch ─▶ publish source ─▶ page images ─▶ publish images
//!     ─▶ extract (per-page publish) ─▶ publish final ─▶ stats + cost report
//! ```
//!
//! Configuration and acquisition failures are fatal and happen before any
//! model call. Page failures never are: they become error markers in the
//! merged document. Publishing the source copy, page images and per-page
//! results is best-effort; publishing the final document is not.

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::model::ChatModelHandle;
use crate::output::{OcrOutput, OcrStats};
use crate::pipeline::extract::PageExtractor;
use crate::pipeline::input::{self, SourceDocument, SourceFormat};
use crate::pipeline::render;
use crate::pricing::report_cost;
use crate::sink::{PageKeys, ResultSink, MARKDOWN_CONTENT_TYPE};
use crate::usage::UsageAccumulator;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Checks that need no I/O: supported extension and provider credential.
pub fn preflight(input_name: &str, config: &OcrConfig) -> Result<SourceFormat, OcrError> {
    let format = SourceFormat::from_name(input_name)?;
    config.model.provider().require_api_key()?;
    Ok(format)
}

/// Process a local path or HTTP(S) URL end to end.
///
/// Resolves the model from `config.model`. Returns `Ok` even when some
/// pages failed; inspect `output.stats.failed_pages` or search the markdown
/// for the error marker.
#[tracing::instrument(skip(config, sink), fields(provider = %config.model.provider(), model = %config.model.model_name()))]
pub async fn process_document(
    input: &str,
    request_id: &str,
    config: &OcrConfig,
    sink: Arc<dyn ResultSink>,
) -> Result<OcrOutput, OcrError> {
    preflight(input, config)?;
    let model = config.model.resolve()?;
    process_document_with_model(input, request_id, config, model, sink).await
}

/// Like [`process_document`] but with a caller-supplied chat handle.
/// The credential preflight is skipped; the handle is assumed ready.
pub async fn process_document_with_model(
    input: &str,
    request_id: &str,
    config: &OcrConfig,
    model: ChatModelHandle,
    sink: Arc<dyn ResultSink>,
) -> Result<OcrOutput, OcrError> {
    let source = input::fetch_source(input, config.download_timeout_secs).await?;
    process_source(source, request_id, config, model, sink).await
}

/// Run the pipeline on an already-loaded source.
pub async fn process_source(
    source: SourceDocument,
    request_id: &str,
    config: &OcrConfig,
    model: ChatModelHandle,
    sink: Arc<dyn ResultSink>,
) -> Result<OcrOutput, OcrError> {
    let total_start = Instant::now();
    let prefix = config.output_prefix_for(request_id);
    let keys = PageKeys::new(prefix, source.stem.clone());

    info!(
        request_id,
        source = %source.file_name,
        bytes = source.bytes.len(),
        output_prefix = keys.prefix(),
        pricing = %config.pricing,
        "Processing document"
    );

    // ── Source copy ──────────────────────────────────────────────────────
    if config.publish_source_copy {
        let key = keys.original(&source.file_name);
        if let Err(e) = sink.publish(&key, &source.bytes, source.format.content_type()).await {
            warn!(key = %key, error = %e, "Failed to publish source copy");
        }
    }

    // ── Page images ──────────────────────────────────────────────────────
    let render_start = Instant::now();
    let pages = render::page_images(&source, config.render_options()).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    drop(source);
    info!("Prepared {} page image(s) in {}ms", pages.len(), render_duration_ms);

    if config.publish_page_images {
        for page in &pages {
            let key = keys.page_image(page.page_number, page.format.extension());
            if let Err(e) = sink.publish(&key, &page.bytes, page.format.media_type()).await {
                warn!(key = %key, error = %e, "Failed to publish page image");
            }
        }
        debug!("Published {} page image(s)", pages.len());
    }

    // ── Extraction ───────────────────────────────────────────────────────
    let accumulator = Arc::new(
        UsageAccumulator::new(model.model_name(), Arc::clone(&config.pricing_table))
            .with_batch_pricing(config.batch_pricing),
    );
    let extractor = PageExtractor::new(Arc::clone(&model), config.system_prompt())
        .with_max_workers(config.max_workers)
        .with_intermediate_sink(Arc::clone(&sink), keys.clone())
        .with_progress(config.progress.clone());

    let extract_start = Instant::now();
    let extraction = extractor.extract(pages, accumulator).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;

    // ── Final document ───────────────────────────────────────────────────
    let final_key = keys.final_markdown();
    sink.publish(
        &final_key,
        extraction.document.markdown.as_bytes(),
        MARKDOWN_CONTENT_TYPE,
    )
    .await
    .map_err(|source| OcrError::FinalPublishFailed {
        key: final_key.clone(),
        source,
    })?;
    info!(key = %final_key, "Published final document");

    // ── Summary ──────────────────────────────────────────────────────────
    let total_pages = extraction.pages.len();
    let succeeded_pages = extraction.success_count();
    let stats = OcrStats {
        total_pages,
        succeeded_pages,
        failed_pages: total_pages - succeeded_pages,
        render_duration_ms,
        extract_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        pages_per_second: pages_per_second(total_pages, extract_duration_ms),
    };
    info!(
        "Total time: {:.1}s Pages per second: {:.2}",
        stats.total_duration_ms as f64 / 1000.0,
        stats.pages_per_second
    );
    report_cost(
        config.pricing,
        &config.pricing_table,
        model.model_name(),
        &extraction.usage,
    );

    Ok(OcrOutput {
        request_id: request_id.to_string(),
        model_name: model.model_name().to_string(),
        final_key,
        markdown: extraction.document.markdown,
        pages: extraction.pages,
        usage: extraction.usage,
        stats,
    })
}

/// Synchronous wrapper around [`process_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_document_sync(
    input: &str,
    request_id: &str,
    config: &OcrConfig,
    sink: Arc<dyn ResultSink>,
) -> Result<OcrOutput, OcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_document(input, request_id, config, sink))
}

fn pages_per_second(pages: usize, elapsed_ms: u64) -> f64 {
    if elapsed_ms == 0 {
        return pages as f64;
    }
    pages as f64 / (elapsed_ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use crate::providers::LlmProvider;

    #[test]
    fn preflight_rejects_extension_before_credentials() {
        let model = ModelConfig::builder(LlmProvider::LlamaCpp)
            .base_url(Some("http://127.0.0.1:8080/v1".into()))
            .build()
            .unwrap();
        let config = OcrConfig::builder(model).build().unwrap();
        assert!(matches!(
            preflight("inbox/notes.txt", &config),
            Err(OcrError::UnsupportedFormat { .. })
        ));
        // LlamaCpp needs no credential.
        assert_eq!(preflight("inbox/scan.PNG", &config).unwrap(), SourceFormat::Png);
    }

    #[test]
    fn pages_per_second_handles_zero_elapsed() {
        assert_eq!(pages_per_second(3, 0), 3.0);
        assert!((pages_per_second(10, 2000) - 5.0).abs() < 1e-9);
    }
}
