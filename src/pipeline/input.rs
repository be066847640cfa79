//! Source acquisition: validate the input name and load its bytes.
//!
//! The document name decides the pipeline branch. Only `.pdf`, `.jpg`,
//! `.jpeg` and `.png` are accepted (case-insensitive); anything else fails
//! with [`OcrError::UnsupportedFormat`] before any I/O happens.
//!
//! Sources are read fully into memory. pdfium can load a PDF straight from a
//! byte buffer, and images are forwarded to the model as-is, so no temporary
//! files are needed.

use crate::error::OcrError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Which branch of the pipeline a source takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Jpeg,
    Png,
}

impl SourceFormat {
    /// Classify a document name by extension.
    pub fn from_name(name: &str) -> Result<Self, OcrError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Ok(SourceFormat::Pdf),
            Some("jpg") | Some("jpeg") => Ok(SourceFormat::Jpeg),
            Some("png") => Ok(SourceFormat::Png),
            _ => Err(OcrError::UnsupportedFormat {
                name: name.to_string(),
            }),
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            SourceFormat::Pdf => "application/pdf",
            SourceFormat::Jpeg => "image/jpeg",
            SourceFormat::Png => "image/png",
        }
    }
}

/// A fully loaded source document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name, e.g. `report.pdf`.
    pub file_name: String,
    /// File name without extension, e.g. `report`. Used in artifact keys.
    pub stem: String,
    pub format: SourceFormat,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    /// Wrap in-memory bytes under `name`. The extension is validated.
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Result<Self, OcrError> {
        let format = SourceFormat::from_name(name)?;
        let path = Path::new(name);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name)
            .to_string();
        let stem = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or(&file_name)
            .to_string();
        Ok(Self {
            file_name,
            stem,
            format,
            bytes,
        })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load `input` (local path or HTTP(S) URL) into memory.
pub async fn fetch_source(input: &str, timeout_secs: u64) -> Result<SourceDocument, OcrError> {
    if is_url(input) {
        let name = url_file_name(input);
        // Reject before downloading anything.
        SourceFormat::from_name(&name)?;
        let bytes = download_url(input, timeout_secs).await?;
        SourceDocument::from_bytes(&name, bytes)
    } else {
        SourceFormat::from_name(input)?;
        let bytes = read_local(input).await?;
        SourceDocument::from_bytes(input, bytes)
    }
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, OcrError> {
    let path = PathBuf::from(path_str);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read local source: {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(OcrError::PermissionDenied { path })
        }
        Err(_) => Err(OcrError::FileNotFound { path }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, OcrError> {
    info!("Downloading source from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;
    if !response.status().is_success() {
        return Err(OcrError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

/// Last path segment of a URL, ignoring query and fragment.
fn url_file_name(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty())
        .unwrap_or_else(|| url.to_string())
}
