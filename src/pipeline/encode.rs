//! Image encoding for the two consumers of rasterised pages: vision-model
//! requests (base64 PNG in `ImageData`) and the external OCR tool (PNG file).
//!
//! PNG is lossless; JPEG artefacts around glyph edges measurably hurt both
//! model and tesseract recognition on scanned pages.

use crate::error::Pdf2DocxError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// PNG-encode an image in memory.
pub fn png_bytes(img: &DynamicImage, page_num: u32) -> Result<Vec<u8>, Pdf2DocxError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| Pdf2DocxError::RasterisationFailed {
            page: page_num as usize,
            detail: format!("PNG encoding failed: {e}"),
        })?;
    Ok(buf)
}

/// Wrap a page as a high-detail base64 PNG attachment for a vision model.
pub fn to_image_data(img: &DynamicImage, page_num: u32) -> Result<ImageData, Pdf2DocxError> {
    let b64 = STANDARD.encode(png_bytes(img, page_num)?);
    debug!("Encoded page {} → {} bytes base64", page_num, b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Write a page as a PNG file for tools that only read from disk.
pub async fn write_png(img: &DynamicImage, page_num: u32, path: &Path) -> Result<(), Pdf2DocxError> {
    let bytes = png_bytes(img, page_num)?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| Pdf2DocxError::io(path, e))
}
