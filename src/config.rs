//! Request configuration for the orchestrator.
//!
//! Everything one document run needs beyond the model itself lives in
//! [`OcrConfig`], built via [`OcrConfigBuilder`]. The model description is a
//! separate, already-validated [`ModelConfig`] so it can be shared and
//! serialised on its own.
//!
//! # Example
//! ```rust
//! use par_ocr::{LlmProvider, ModelConfig, OcrConfig, PricingDisplay};
//!
//! let model = ModelConfig::builder(LlmProvider::OpenAi)
//!     .model_name("gpt-4o-mini")
//!     .build()
//!     .unwrap();
//! let config = OcrConfig::builder(model)
//!     .max_workers(Some(8))
//!     .pricing(PricingDisplay::Price)
//!     .dpi(200)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.dpi, 200);
//! ```

use crate::error::OcrError;
use crate::model::ModelConfig;
use crate::pipeline::render::{PageImageFormat, RenderOptions};
use crate::pricing::{PricingDisplay, PricingTable};
use crate::progress::ProgressHandle;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use std::fmt;
use std::sync::Arc;

/// Bounds on the longest edge of a rendered page, in pixels.
pub const MIN_RENDERED_PIXELS: u32 = 100;
pub const MAX_RENDERED_PIXELS: u32 = 16_384;

/// Configuration for one document run.
#[derive(Clone)]
pub struct OcrConfig {
    /// Validated model description; resolved into a chat handle per run.
    pub model: ModelConfig,

    /// Bound on concurrent page tasks. `None` picks
    /// `min(pages, min(32, cpus + 4))`.
    pub max_workers: Option<usize>,

    /// How much usage/cost detail to log after a run. Default: details.
    pub pricing: PricingDisplay,

    /// Price usage at the batch discount.
    pub batch_pricing: bool,

    /// Pricing table used for cost computation. Default: built-in table.
    pub pricing_table: Arc<PricingTable>,

    /// Rendering DPI for PDF pages. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Cap on either edge of a rendered page, in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Encoding of rendered PDF pages. Default: PNG.
    pub page_format: PageImageFormat,

    /// Replaces [`DEFAULT_SYSTEM_PROMPT`] when set.
    pub system_prompt: Option<String>,

    /// Timeout for fetching a source over HTTP(S). Default: 120.
    pub download_timeout_secs: u64,

    /// Prefix for every published key. `None` means `outbox/{request_id}`.
    pub output_prefix: Option<String>,

    /// Publish a copy of the source document. Default: true.
    pub publish_source_copy: bool,

    /// Publish every page image. Default: true.
    pub publish_page_images: bool,

    /// Optional per-page event callback.
    pub progress: Option<ProgressHandle>,
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("model", &self.model)
            .field("max_workers", &self.max_workers)
            .field("pricing", &self.pricing)
            .field("batch_pricing", &self.batch_pricing)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("page_format", &self.page_format)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("output_prefix", &self.output_prefix)
            .field("publish_source_copy", &self.publish_source_copy)
            .field("publish_page_images", &self.publish_page_images)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn ExtractionProgress>"))
            .finish()
    }
}

impl OcrConfig {
    pub fn builder(model: ModelConfig) -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: OcrConfig {
                model,
                max_workers: None,
                pricing: PricingDisplay::default(),
                batch_pricing: false,
                pricing_table: Arc::new(PricingTable::default()),
                dpi: 150,
                max_rendered_pixels: 2000,
                page_format: PageImageFormat::default(),
                system_prompt: None,
                download_timeout_secs: 120,
                output_prefix: None,
                publish_source_copy: true,
                publish_page_images: true,
                progress: None,
            },
        }
    }

    /// The system prompt sent with every page.
    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// `output_prefix`, or `outbox/{request_id}`.
    pub fn output_prefix_for(&self, request_id: &str) -> String {
        match &self.output_prefix {
            Some(prefix) => prefix.clone(),
            None => format!("outbox/{request_id}"),
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            dpi: self.dpi,
            max_rendered_pixels: self.max_rendered_pixels,
            format: self.page_format,
        }
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    /// `Some(0)` is treated as unset.
    pub fn max_workers(mut self, n: Option<usize>) -> Self {
        self.config.max_workers = n.filter(|&n| n > 0);
        self
    }

    pub fn pricing(mut self, display: PricingDisplay) -> Self {
        self.config.pricing = display;
        self
    }

    pub fn batch_pricing(mut self, v: bool) -> Self {
        self.config.batch_pricing = v;
        self
    }

    pub fn pricing_table(mut self, table: Arc<PricingTable>) -> Self {
        self.config.pricing_table = table;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px;
        self
    }

    pub fn page_format(mut self, format: PageImageFormat) -> Self {
        self.config.page_format = format;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Empty strings are treated as unset.
    pub fn output_prefix(mut self, prefix: Option<String>) -> Self {
        self.config.output_prefix = prefix
            .map(|p| p.trim().trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());
        self
    }

    pub fn publish_source_copy(mut self, v: bool) -> Self {
        self.config.publish_source_copy = v;
        self
    }

    pub fn publish_page_images(mut self, v: bool) -> Self {
        self.config.publish_page_images = v;
        self
    }

    pub fn progress(mut self, progress: ProgressHandle) -> Self {
        self.config.progress = Some(progress);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if !(72..=400).contains(&c.dpi) {
            return Err(OcrError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if !(MIN_RENDERED_PIXELS..=MAX_RENDERED_PIXELS).contains(&c.max_rendered_pixels) {
            return Err(OcrError::InvalidConfig(format!(
                "max_rendered_pixels must be {MIN_RENDERED_PIXELS}–{MAX_RENDERED_PIXELS}, got {}",
                c.max_rendered_pixels
            )));
        }
        if c.download_timeout_secs == 0 {
            return Err(OcrError::InvalidConfig(
                "download timeout must be ≥ 1 second".into(),
            ));
        }
        if c.system_prompt.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(OcrError::InvalidConfig("system prompt is empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LlmProvider;

    fn model() -> ModelConfig {
        ModelConfig::builder(LlmProvider::OpenAi).build().unwrap()
    }

    #[test]
    fn defaults() {
        let c = OcrConfig::builder(model()).build().unwrap();
        assert_eq!(c.dpi, 150);
        assert_eq!(c.max_rendered_pixels, 2000);
        assert_eq!(c.max_workers, None);
        assert_eq!(c.pricing, PricingDisplay::Details);
        assert_eq!(c.system_prompt(), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(c.output_prefix_for("req-1"), "outbox/req-1");
        assert!(c.publish_source_copy);
        assert!(c.publish_page_images);
    }

    #[test]
    fn zero_workers_means_default() {
        let c = OcrConfig::builder(model()).max_workers(Some(0)).build().unwrap();
        assert_eq!(c.max_workers, None);
    }

    #[test]
    fn output_prefix_override() {
        let c = OcrConfig::builder(model())
            .output_prefix(Some("results/batch-7/".into()))
            .build()
            .unwrap();
        assert_eq!(c.output_prefix_for("ignored"), "results/batch-7");

        let c = OcrConfig::builder(model())
            .output_prefix(Some("  ".into()))
            .build()
            .unwrap();
        assert_eq!(c.output_prefix_for("req-2"), "outbox/req-2");
    }

    #[test]
    fn validation() {
        assert!(OcrConfig::builder(model()).dpi(50).build().is_err());
        assert!(OcrConfig::builder(model()).max_rendered_pixels(10).build().is_err());
        assert!(OcrConfig::builder(model())
            .max_rendered_pixels(u32::MAX)
            .build()
            .is_err());
        assert!(OcrConfig::builder(model())
            .max_rendered_pixels(MAX_RENDERED_PIXELS)
            .build()
            .is_ok());
        assert!(OcrConfig::builder(model()).download_timeout_secs(0).build().is_err());
        assert!(OcrConfig::builder(model()).system_prompt(" ").build().is_err());
    }
}
