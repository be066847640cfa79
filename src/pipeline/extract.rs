//! Page extraction: bounded concurrent model calls, one task per page.
//!
//! ## Contract
//!
//! * Every input page yields exactly one [`PageResult`]; a failed call turns
//!   into an error-marker segment instead of aborting the document.
//! * Tasks complete in any order. Results are sorted by page number after all
//!   tasks have joined, and that sort is the only ordering guarantee.
//! * The usage accumulator is the only shared mutable state. Successful calls
//!   record into it; failed calls contribute nothing.
//! * Each page is published to the intermediate sink (if any) under its own
//!   key. Publishing is best-effort.
//!
//! Each page runs inside `tokio::spawn` so a panic in one page (a misbehaving
//! adapter or progress callback) surfaces as that page's
//! [`ProviderError::TaskFailed`] and the rest of the document carries on.

use super::encode::EncodedImage;
use super::postprocess::{error_content, merge_segments, page_content};
use super::render::PageImage;
use crate::error::{OcrError, ProviderError};
use crate::model::{ChatModelHandle, ChatReply, UserContent};
use crate::output::{Extraction, MergedDocument, PageResult};
use crate::progress::ProgressHandle;
use crate::prompts::USER_INSTRUCTION;
use crate::sink::{PageKeys, ResultSink, MARKDOWN_CONTENT_TYPE};
use crate::usage::{TokenUsage, UsageAccumulator};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound on the default worker count.
const MAX_DEFAULT_WORKERS: usize = 32;

/// Default bound: `min(page_count, min(32, available_parallelism + 4))`, at least 1.
pub fn default_workers(page_count: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    page_count.min(MAX_DEFAULT_WORKERS.min(cpus + 4)).max(1)
}

/// Drives per-page extraction for one document.
#[derive(Clone)]
pub struct PageExtractor {
    model: ChatModelHandle,
    system_prompt: Arc<str>,
    max_workers: Option<usize>,
    intermediate: Option<(Arc<dyn ResultSink>, PageKeys)>,
    progress: Option<ProgressHandle>,
}

impl std::fmt::Debug for PageExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageExtractor")
            .field("model", &self.model.model_name())
            .field("max_workers", &self.max_workers)
            .field("intermediate", &self.intermediate.as_ref().map(|(_, k)| k.prefix()))
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl PageExtractor {
    pub fn new(model: ChatModelHandle, system_prompt: impl Into<Arc<str>>) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            max_workers: None,
            intermediate: None,
            progress: None,
        }
    }

    /// `None` or `Some(0)` selects [`default_workers`].
    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers.filter(|&n| n > 0);
        self
    }

    /// Publish each page's segment to `sink` under `keys.page_markdown(n)`.
    pub fn with_intermediate_sink(mut self, sink: Arc<dyn ResultSink>, keys: PageKeys) -> Self {
        self.intermediate = Some((sink, keys));
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressHandle>) -> Self {
        self.progress = progress;
        self
    }

    /// Worker bound that [`Self::extract`] will use for `page_count` pages.
    pub fn worker_count(&self, page_count: usize) -> usize {
        match self.max_workers {
            Some(n) => n.min(page_count.max(1)),
            None => default_workers(page_count),
        }
    }

    /// Extract every page and merge the segments in page order.
    ///
    /// Fails only on invalid input (no pages, page 0, duplicate numbers).
    /// Page-level failures are embedded in the document as error markers.
    pub async fn extract(
        &self,
        pages: Vec<PageImage>,
        accumulator: Arc<UsageAccumulator>,
    ) -> Result<Extraction, OcrError> {
        validate_pages(&pages)?;

        let total = pages.len();
        let workers = self.worker_count(total);
        info!(
            pages = total,
            workers,
            model = self.model.model_name(),
            "Starting page extraction"
        );
        if let Some(cb) = &self.progress {
            cb.on_extraction_start(total);
        }

        let ctx = Arc::new(TaskContext {
            model: Arc::clone(&self.model),
            system_prompt: Arc::clone(&self.system_prompt),
            intermediate: self.intermediate.clone(),
            progress: self.progress.clone(),
            accumulator: Arc::clone(&accumulator),
            total,
        });

        let mut results: Vec<PageResult> = stream::iter(pages.into_iter().map(|page| {
            let ctx = Arc::clone(&ctx);
            async move {
                let page_number = page.page_number;
                let started = Instant::now();
                match tokio::spawn(run_page(Arc::clone(&ctx), page)).await {
                    // Usage counts only once the task has returned, so a page
                    // whose task dies after the model call contributes nothing.
                    Ok(result) => {
                        if result.succeeded {
                            ctx.accumulator.record(&result.usage);
                        }
                        result
                    }
                    Err(join_err) => {
                        let err = ProviderError::TaskFailed(join_err.to_string());
                        ctx.finish(page_number, Err(err), started).await
                    }
                }
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await;

        results.sort_by_key(|r| r.page_number);

        let markdown = merge_segments(results.iter().map(|r| r.content.as_str()));
        let success_count = results.iter().filter(|r| r.succeeded).count();
        info!(
            pages = total,
            succeeded = success_count,
            failed = total - success_count,
            "Page extraction complete"
        );
        if let Some(cb) = &self.progress {
            cb.on_extraction_complete(total, success_count);
        }

        Ok(Extraction {
            document: MergedDocument {
                markdown,
                page_count: total,
            },
            pages: results,
            usage: accumulator.snapshot(),
        })
    }
}

/// Reject inputs the merge step could not represent faithfully.
fn validate_pages(pages: &[PageImage]) -> Result<(), OcrError> {
    if pages.is_empty() {
        return Err(OcrError::NoPages);
    }
    let mut seen = HashSet::with_capacity(pages.len());
    for page in pages {
        if page.page_number == 0 {
            return Err(OcrError::InvalidPageNumber {
                page: page.page_number,
            });
        }
        if !seen.insert(page.page_number) {
            return Err(OcrError::DuplicatePage {
                page: page.page_number,
            });
        }
    }
    Ok(())
}

/// Read-only state shared by every page task of one extraction.
struct TaskContext {
    model: ChatModelHandle,
    system_prompt: Arc<str>,
    intermediate: Option<(Arc<dyn ResultSink>, PageKeys)>,
    progress: Option<ProgressHandle>,
    accumulator: Arc<UsageAccumulator>,
    total: usize,
}

async fn run_page(ctx: Arc<TaskContext>, page: PageImage) -> PageResult {
    let started = Instant::now();
    let page_number = page.page_number;
    if let Some(cb) = &ctx.progress {
        cb.on_page_start(page_number, ctx.total);
    }

    let content = UserContent {
        text: USER_INSTRUCTION.to_string(),
        image: EncodedImage::from_page(&page),
    };
    drop(page);

    let outcome = ctx.model.invoke(&ctx.system_prompt, &content).await;
    ctx.finish(page_number, outcome, started).await
}

impl TaskContext {
    /// Turn a call outcome into the page's result, notify, publish.
    async fn finish(
        &self,
        page_number: u32,
        outcome: Result<ChatReply, ProviderError>,
        started: Instant,
    ) -> PageResult {
        let duration_ms = started.elapsed().as_millis() as u64;

        let (content, succeeded, usage) = match outcome {
            Ok(reply) => {
                let content = page_content(&reply.text, page_number);
                debug!(
                    page = page_number,
                    input_tokens = reply.usage.input_tokens,
                    output_tokens = reply.usage.output_tokens,
                    duration_ms,
                    "Page extracted"
                );
                if let Some(cb) = &self.progress {
                    cb.on_page_complete(page_number, self.total, content.len());
                }
                (content, true, reply.usage)
            }
            Err(err) => {
                warn!(page = page_number, error = %err, "Error extracting text from image");
                if let Some(cb) = &self.progress {
                    cb.on_page_error(page_number, self.total, &err.to_string());
                }
                (error_content(page_number, &err), false, TokenUsage::default())
            }
        };

        if let Some((sink, keys)) = &self.intermediate {
            let key = keys.page_markdown(page_number);
            if let Err(e) = sink.publish(&key, content.as_bytes(), MARKDOWN_CONTENT_TYPE).await {
                warn!(page = page_number, key = %key, error = %e, "Failed to publish page result");
            }
        }

        PageResult {
            page_number,
            content,
            succeeded,
            usage,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::render::PageImageFormat;

    fn page(n: u32) -> PageImage {
        PageImage::new(n, vec![0u8; 4], PageImageFormat::Png)
    }

    #[test]
    fn default_workers_is_bounded() {
        assert_eq!(default_workers(1), 1);
        assert!(default_workers(1000) <= MAX_DEFAULT_WORKERS);
        assert!(default_workers(0) >= 1);
    }

    #[test]
    fn validate_rejects_empty_zero_and_duplicates() {
        assert!(matches!(validate_pages(&[]), Err(OcrError::NoPages)));
        assert!(matches!(
            validate_pages(&[page(1), page(0)]),
            Err(OcrError::InvalidPageNumber { page: 0 })
        ));
        assert!(matches!(
            validate_pages(&[page(1), page(2), page(1)]),
            Err(OcrError::DuplicatePage { page: 1 })
        ));
        assert!(validate_pages(&[page(3), page(1), page(2)]).is_ok());
    }
}
