//! Error types for the par-ocr library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`OcrError`]: **Fatal**: the request cannot proceed at all (bad
//!   provider/mode combination, missing credential, unsupported file type,
//!   unreadable source). Returned as `Err(OcrError)` from configuration
//!   builders and the top-level `process*` functions. No page is extracted.
//!
//! * [`ProviderError`]: **Page-local**: one model invocation failed (rate
//!   limit, auth, timeout, malformed reply). Caught at the page-task boundary
//!   and turned into an inline error marker in the merged document.
//!
//! * [`PublishError`]: **Best-effort**: writing a per-page artifact failed.
//!   Logged and otherwise ignored; the page's text has already been produced.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the par-ocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Provider name did not match any registered provider.
    #[error("Unknown LLM provider '{name}'\nSupported: openai, anthropic, bedrock, llamacpp")]
    UnknownProvider { name: String },

    /// The provider cannot serve the requested mode.
    #[error("{provider} provider does not support mode {mode}")]
    UnsupportedMode { provider: String, mode: String },

    /// The provider's credential environment variable is unset or empty.
    #[error("{env_key} environment variable not set.\nExport it before running with provider '{provider}'.")]
    MissingCredential { provider: String, env_key: String },

    /// The provider only works against an explicit endpoint.
    #[error("Provider '{provider}' requires a base URL.\nSet AI_BASE_URL or --base-url.")]
    BaseUrlRequired { provider: String },

    /// A base URL override was given to a provider that cannot use one.
    #[error("Provider '{provider}' does not support a base URL override (got '{base_url}')")]
    BaseUrlNotSupported { provider: String, base_url: String },

    /// The input file extension is not one of pdf/jpg/jpeg/png.
    #[error("Input file '{name}' has an unsupported extension. Only pdf, jpg, and png are supported.")]
    UnsupportedFormat { name: String },

    // ── Acquisition errors ────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: u32, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Install libpdfium for your platform or set PDFIUM_LIB_PATH to the directory that contains it."
    )]
    PdfiumBindingFailed(String),

    // ── Extraction preconditions ──────────────────────────────────────────
    /// The extractor was handed an empty page list.
    #[error("No pages to extract")]
    NoPages,

    /// Page numbers start at 1.
    #[error("Page number {page} is invalid; pages are numbered from 1")]
    InvalidPageNumber { page: u32 },

    /// Two input pages carried the same page number.
    #[error("Page number {page} appears more than once")]
    DuplicatePage { page: u32 },

    // ── Publishing errors ─────────────────────────────────────────────────
    /// The merged document could not be written to the outbox.
    #[error("Failed to publish final result '{key}': {source}")]
    FinalPublishFailed {
        key: String,
        #[source]
        source: PublishError,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// True for pre-flight configuration failures (provider, mode,
    /// credentials, base URL rules, unsupported extension).
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            OcrError::InvalidConfig(_)
                | OcrError::UnknownProvider { .. }
                | OcrError::UnsupportedMode { .. }
                | OcrError::MissingCredential { .. }
                | OcrError::BaseUrlRequired { .. }
                | OcrError::BaseUrlNotSupported { .. }
                | OcrError::UnsupportedFormat { .. }
        )
    }

    /// True when the source document could not be obtained.
    pub fn is_acquisition_error(&self) -> bool {
        matches!(
            self,
            OcrError::FileNotFound { .. }
                | OcrError::PermissionDenied { .. }
                | OcrError::DownloadFailed { .. }
                | OcrError::DownloadTimeout { .. }
        )
    }
}

/// A failed model invocation for a single page.
///
/// Never propagated past the page task: the extractor renders it into the
/// page's error marker via its `Display` impl.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ProviderError {
    /// HTTP 429 or a provider-specific throttling response.
    #[error("rate limit exceeded for provider '{provider}'")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// 401/403: retrying will not help.
    #[error("authentication failed for provider '{provider}': {detail}")]
    Auth { provider: String, detail: String },

    /// The per-call timeout from `ModelConfig` expired.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider answered but the reply could not be understood.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Any other provider-side failure.
    #[error("{0}")]
    Api(String),

    /// The page task itself died (panic, runtime shutdown).
    #[error("page task failed: {0}")]
    TaskFailed(String),
}

/// Failure to write one artifact to a [`crate::sink::ResultSink`].
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("I/O error writing '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The sink refused the key or content.
    #[error("sink rejected '{key}': {reason}")]
    Rejected { key: String, reason: String },
}
