//! Image encoding: `DynamicImage` → PNG/JPEG bytes, and page bytes → base64
//! payload for the model request.
//!
//! PNG is the default for rasterised pages because it is lossless; JPEG
//! artefacts on rendered text confuse vision models. The media type sent to
//! the model is sniffed from the bytes rather than trusted from the file
//! name, so a mislabelled `.jpg` that is really a PNG is still described
//! correctly.

use super::render::{PageImage, PageImageFormat};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Base64 image payload plus its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub media_type: &'static str,
    /// Standard base64, no data-URI prefix.
    pub data: String,
}

impl EncodedImage {
    /// Encode a page image for a model request.
    pub fn from_page(page: &PageImage) -> Self {
        let media_type = detect_media_type(&page.bytes).unwrap_or(page.format.media_type());
        let data = STANDARD.encode(&page.bytes);
        debug!(
            "Encoded page {} → {} bytes base64 ({})",
            page.page_number,
            data.len(),
            media_type
        );
        Self { media_type, data }
    }

    /// `data:<media>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// Media type from magic bytes, for the two formats the pipeline accepts.
pub fn detect_media_type(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        _ => None,
    }
}

/// Encode a rendered page bitmap.
pub fn encode_image(img: &DynamicImage, format: PageImageFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        PageImageFormat::Png => img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?,
        // JPEG has no alpha channel.
        PageImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8())
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)?,
    }
    Ok(buf)
}
