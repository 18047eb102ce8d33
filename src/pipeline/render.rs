//! PDF access via pdfium: rasterise pages, read the text layer, read metadata.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-aware. Every entry point here moves its work onto the blocking pool
//! so Tokio worker threads never stall during rendering.
//!
//! ## Locating pdfium
//!
//! `PDFIUM_LIB_PATH` may name the shared library itself or the directory
//! holding it; otherwise the working directory and then the system library
//! path are tried. Failure to bind is reported as
//! [`Pdf2DocxError::BackendUnavailable`] so callers can fall back.

use crate::document::BBox;
use crate::error::Pdf2DocxError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One rasterised page. `bbox` coordinates downstream are in this image's pixels.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based.
    pub page_num: u32,
    pub image: DynamicImage,
}

impl PageImage {
    pub fn width(&self) -> f64 {
        f64::from(self.image.width())
    }

    pub fn height(&self) -> f64 {
        f64::from(self.image.height())
    }
}

/// A run of text from the PDF text layer with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSegment {
    /// Top-left-origin pixels at the requested DPI.
    pub bbox: BBox,
    pub text: String,
}

/// The text layer of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based.
    pub page_num: u32,
    pub width: f64,
    pub height: f64,
    pub text: String,
    pub segments: Vec<TextSegment>,
}

/// Document metadata, readable without recognition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

// ── Binding ──────────────────────────────────────────────────────────────────

/// Bind to a pdfium shared library.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2DocxError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(configured) => {
            let path = PathBuf::from(configured);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(&lib).map_err(|e| unavailable(format!(
                "PDFIUM_LIB_PATH points at '{}' but it could not be loaded: {e:?}",
                lib.display()
            )))?
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| unavailable(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}

fn unavailable(detail: String) -> Pdf2DocxError {
    Pdf2DocxError::BackendUnavailable {
        backend: "pdfium".to_string(),
        hint: format!(
            "{detail}\n\
Install a pdfium build (e.g. from github.com/bblanchon/pdfium-binaries) and\n\
set PDFIUM_LIB_PATH=/path/to/libpdfium or place it on the library path."
        ),
    }
}

/// Map a pdfium load error onto the password/corruption variants.
fn load_error(e: PdfiumError, path: &Path, password: Option<&str>) -> Pdf2DocxError {
    match e {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            if password.is_some() {
                Pdf2DocxError::WrongPassword {
                    path: path.to_path_buf(),
                }
            } else {
                Pdf2DocxError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            }
        }
        other => Pdf2DocxError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{other:?}"),
        },
    }
}

async fn blocking<T, F>(what: &str, f: F) -> Result<T, Pdf2DocxError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Pdf2DocxError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Pdf2DocxError::Internal(format!("{what} task panicked: {e}")))?
}

// ── Rasterisation ────────────────────────────────────────────────────────────

/// Rasterise every page at `dpi`, capping the longest edge at `max_pixels`.
pub async fn render_pages(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<PageImage>, Pdf2DocxError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);
    blocking("Render", move || {
        render_pages_blocking(&path, dpi, max_pixels, password.as_deref())
    })
    .await
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<PageImage>, Pdf2DocxError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(e, pdf_path, password))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} pages", total);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(total);
    for idx in 0..total {
        let page_num = idx + 1;
        let page = pages
            .get(idx as u16)
            .map_err(|e| Pdf2DocxError::RasterisationFailed {
                page: page_num,
                detail: format!("{e:?}"),
            })?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| Pdf2DocxError::RasterisationFailed {
                page: page_num,
                detail: format!("{e:?}"),
            })?;
        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", page_num, image.width(), image.height());
        results.push(PageImage {
            page_num: page_num as u32,
            image,
        });
    }
    Ok(results)
}

// ── Text layer ───────────────────────────────────────────────────────────────

/// Read the embedded text layer of every page, positions scaled to `dpi`.
pub async fn extract_text(
    pdf_path: &Path,
    dpi: u32,
    password: Option<&str>,
) -> Result<Vec<PageText>, Pdf2DocxError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);
    blocking("Text extraction", move || {
        extract_text_blocking(&path, dpi, password.as_deref())
    })
    .await
}

fn extract_text_blocking(
    pdf_path: &Path,
    dpi: u32,
    password: Option<&str>,
) -> Result<Vec<PageText>, Pdf2DocxError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(e, pdf_path, password))?;

    let scale = f64::from(dpi) / 72.0;
    let mut out = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let page_num = idx as u32 + 1;
        let page_h = f64::from(page.height().value);
        let page_w = f64::from(page.width().value);
        let text_page = page.text().map_err(|e| Pdf2DocxError::RasterisationFailed {
            page: page_num as usize,
            detail: format!("text layer: {e:?}"),
        })?;

        let segments = text_page
            .segments()
            .iter()
            .filter_map(|seg| {
                let text = seg.text();
                if text.trim().is_empty() {
                    return None;
                }
                let r = seg.bounds();
                Some(TextSegment {
                    bbox: [
                        f64::from(r.left().value) * scale,
                        (page_h - f64::from(r.top().value)) * scale,
                        f64::from(r.right().value) * scale,
                        (page_h - f64::from(r.bottom().value)) * scale,
                    ],
                    text,
                })
            })
            .collect();

        out.push(PageText {
            page_num,
            width: page_w * scale,
            height: page_h * scale,
            text: text_page.all(),
            segments,
        });
    }
    debug!("Read text layer of {} pages", out.len());
    Ok(out)
}

// ── Metadata ─────────────────────────────────────────────────────────────────

/// Extract document metadata without rendering pages.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentInfo, Pdf2DocxError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);
    blocking("Metadata", move || {
        extract_metadata_blocking(&path, password.as_deref())
    })
    .await
}

fn extract_metadata_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentInfo, Pdf2DocxError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(e, pdf_path, password))?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(DocumentInfo {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_error_maps_by_presence() {
        let p = Path::new("a.pdf");
        let e = load_error(
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError),
            p,
            None,
        );
        assert!(matches!(e, Pdf2DocxError::PasswordRequired { .. }));

        let e = load_error(
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError),
            p,
            Some("x"),
        );
        assert!(matches!(e, Pdf2DocxError::WrongPassword { .. }));

        let e = load_error(
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError),
            p,
            None,
        );
        assert!(matches!(e, Pdf2DocxError::CorruptPdf { .. }));
    }

    #[test]
    fn page_image_dimensions() {
        let img = PageImage {
            page_num: 1,
            image: DynamicImage::new_rgb8(30, 40),
        };
        assert_eq!(img.width(), 30.0);
        assert_eq!(img.height(), 40.0);
    }
}
