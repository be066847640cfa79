//! # par-ocr
//!
//! Extract the text of PDFs and scanned images with vision-capable LLMs,
//! one page per model call, in parallel.
//!
//! ## Why page-level fan-out?
//!
//! Vision models read one image at a time and a single call can take tens of
//! seconds. Splitting a document into pages and extracting them concurrently
//! cuts wall time roughly by the worker count, and it lets one bad page fail
//! on its own: the merged document still carries every page, with an inline
//! error marker where extraction failed.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source (path / URL)
//!  │
//!  ├─ 1. Input    validate extension, load bytes
//!  ├─ 2. Render   PDF → page images via pdfium; JPEG/PNG → one page
//!  ├─ 3. Encode   sniff media type, base64
//!  ├─ 4. Extract  bounded concurrent model calls, per-page error capture
//!  ├─ 5. Merge    strip fences, append "Page # n", sort, join
//!  └─ 6. Publish  per-page results, page images, final document
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use par_ocr::{process_document, DirectorySink, LlmProvider, ModelConfig, OcrConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = ModelConfig::builder(LlmProvider::OpenAi).build()?;
//!     let config = OcrConfig::builder(model).build()?;
//!     let sink = Arc::new(DirectorySink::new("./out"));
//!     let output = process_document("scan.pdf", "req-1", &config, sink).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("cost: ${:.4}", output.usage.total_cost);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `par-ocr` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! par-ocr = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod outbox;
pub mod output;
pub mod pipeline;
pub mod pricing;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod sink;
pub mod usage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrConfig, OcrConfigBuilder};
pub use convert::{preflight, process_document, process_document_sync, process_document_with_model, process_source};
pub use error::{OcrError, ProviderError, PublishError};
pub use model::{ChatModel, ChatModelHandle, ChatReply, LlmMode, ModelConfig, ModelConfigBuilder, SamplingOptions, UserContent};
pub use outbox::{OutboxOutcome, OutboxWatcher};
pub use output::{Extraction, MergedDocument, OcrOutput, OcrStats, PageResult};
pub use pipeline::encode::EncodedImage;
pub use pipeline::extract::PageExtractor;
pub use pipeline::input::{fetch_source, SourceDocument, SourceFormat};
pub use pipeline::render::{page_images, PageImage, PageImageFormat, RenderOptions};
pub use pricing::{ModelPricing, PricingDisplay, PricingTable};
pub use progress::{ExtractionProgress, NoopProgress, ProgressHandle};
pub use providers::{LlmProvider, ProviderInfo};
pub use sink::{DirectorySink, MemorySink, PageKeys, ResultSink};
pub use usage::{TokenUsage, UsageAccumulator, UsageMetadata};
