//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgress>`] via
//! [`crate::config::OcrConfigBuilder::progress`] to receive events as the
//! extractor works through a document. Callbacks are a thin integration
//! point: the CLI drives an `indicatif` bar from them, a service could forward
//! them to a channel. Pages run concurrently, so page events arrive from
//! different tasks in completion order, not page order.
//!
//! # Example
//!
//! ```rust
//! use par_ocr::ExtractionProgress;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ExtractionProgress for Counter {
//!     fn on_page_complete(&self, page: u32, total: usize, content_len: usize) {
//!         let done = self.0.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("page {page} done ({done}/{total}, {content_len} bytes)");
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the extractor as it processes each page.
///
/// All methods default to no-ops, so implementors override only what they
/// need. Implementations must tolerate concurrent calls.
pub trait ExtractionProgress: Send + Sync {
    /// Once, before any page task starts.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Just before the model call for `page`.
    fn on_page_start(&self, page: u32, total_pages: usize) {
        let _ = (page, total_pages);
    }

    /// `page` produced text; `content_len` is the segment length in bytes.
    fn on_page_complete(&self, page: u32, total_pages: usize, content_len: usize) {
        let _ = (page, total_pages, content_len);
    }

    /// `page` failed and was replaced by an error marker.
    fn on_page_error(&self, page: u32, total_pages: usize, error: &str) {
        let _ = (page, total_pages, error);
    }

    /// Once, after every page has been attempted.
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// No-op implementation, used when no callback is configured.
pub struct NoopProgress;

impl ExtractionProgress for NoopProgress {}

/// Type stored in [`crate::config::OcrConfig`].
pub type ProgressHandle = Arc<dyn ExtractionProgress>;
