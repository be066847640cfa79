//! Page images: rasterise PDFs via pdfium, or wrap a single image source.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. `tokio::task::spawn_blocking` keeps that work off
//! the async worker threads.
//!
//! ## Sizing
//!
//! Pages are scaled by `dpi / 72` and then capped so neither edge exceeds
//! `max_rendered_pixels`. An A0 poster at 150 DPI would otherwise produce a
//! 12,000 × 17,000 px image.

use super::encode::encode_image;
use super::input::{SourceDocument, SourceFormat};
use crate::error::OcrError;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Encoding used for rasterised PDF pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageImageFormat {
    /// Lossless; keeps small glyphs crisp. (default)
    #[default]
    Png,
    Jpeg,
}

impl PageImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            PageImageFormat::Png => "png",
            PageImageFormat::Jpeg => "jpg",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            PageImageFormat::Png => "image/png",
            PageImageFormat::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for PageImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PageImageFormat::Png => "png",
            PageImageFormat::Jpeg => "jpeg",
        })
    }
}

impl FromStr for PageImageFormat {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(PageImageFormat::Png),
            "jpg" | "jpeg" => Ok(PageImageFormat::Jpeg),
            other => Err(OcrError::InvalidConfig(format!(
                "unknown page image format '{other}' (expected png or jpeg)"
            ))),
        }
    }
}

/// One encoded page image. `page_number` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub page_number: u32,
    pub bytes: Vec<u8>,
    pub format: PageImageFormat,
}

impl PageImage {
    pub fn new(page_number: u32, bytes: Vec<u8>, format: PageImageFormat) -> Self {
        Self {
            page_number,
            bytes,
            format,
        }
    }
}

/// Rendering knobs, copied out of the request config so they can move into
/// the blocking task.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
    pub format: PageImageFormat,
}

/// Produce the ordered page images for `source`.
///
/// An image source yields exactly one page carrying the original bytes; no
/// rasterisation happens. A PDF yields one image per page, numbered from 1.
pub async fn page_images(source: &SourceDocument, options: RenderOptions) -> Result<Vec<PageImage>, OcrError> {
    match source.format {
        SourceFormat::Jpeg => Ok(vec![PageImage::new(1, source.bytes.clone(), PageImageFormat::Jpeg)]),
        SourceFormat::Png => Ok(vec![PageImage::new(1, source.bytes.clone(), PageImageFormat::Png)]),
        SourceFormat::Pdf => rasterize(source.file_name.clone(), source.bytes.clone(), options).await,
    }
}

/// Rasterise every page of a PDF held in memory.
pub async fn rasterize(name: String, bytes: Vec<u8>, options: RenderOptions) -> Result<Vec<PageImage>, OcrError> {
    tokio::task::spawn_blocking(move || rasterize_blocking(&name, bytes, options))
        .await
        .map_err(|e| OcrError::Internal(format!("Render task panicked: {}", e)))?
}

fn rasterize_blocking(name: &str, bytes: Vec<u8>, options: RenderOptions) -> Result<Vec<PageImage>, OcrError> {
    let max_px = pixel_cap(options.max_rendered_pixels)?;
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_vec(bytes, None)
        .map_err(|e| OcrError::CorruptPdf {
            name: name.to_string(),
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(options.dpi as f32 / 72.0)
        .set_maximum_width(max_px)
        .set_maximum_height(max_px);

    let mut results = Vec::new();
    for (idx, page) in pages.iter().enumerate() {
        let page_number = idx as u32 + 1;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| OcrError::RasterisationFailed {
                page: page_number,
                detail: format!("{:?}", e),
            })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_number,
            image.width(),
            image.height()
        );

        let encoded = encode_image(&image, options.format).map_err(|e| OcrError::RasterisationFailed {
            page: page_number,
            detail: e.to_string(),
        })?;
        results.push(PageImage::new(page_number, encoded, options.format));
    }

    Ok(results)
}

/// pdfium takes the bitmap bound as `i32`.
fn pixel_cap(max_rendered_pixels: u32) -> Result<i32, OcrError> {
    i32::try_from(max_rendered_pixels).map_err(|_| {
        OcrError::InvalidConfig(format!(
            "max_rendered_pixels {max_rendered_pixels} exceeds the renderer limit"
        ))
    })
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` first, then the working directory,
/// then the system library search path.
fn bind_pdfium() -> Result<Pdfium, OcrError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| OcrError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}
