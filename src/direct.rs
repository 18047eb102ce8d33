//! Direct PDF → DOCX conversion, without a task or a model.
//!
//! The text layer is read page by page. With [`ConvertOptions::use_ocr`],
//! pages whose text layer is nearly empty (scanned pages) are rasterised and
//! read by `tesseract` instead. The resulting paragraphs go through the same
//! filter/order/merge/export chain as the task pipeline, then the renderer.

use crate::config::{ConversionConfig, ConvertOptions};
use crate::document::{Page, StructuredDocument};
use crate::error::Pdf2DocxError;
use crate::pipeline::docx::DocumentRenderer;
use crate::pipeline::extract::refine;
use crate::pipeline::input::resolve_local;
use crate::pipeline::{encode, markdown, render};
use crate::recognize::text_layer::paragraphs_from_text;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

/// Pages with fewer text-layer characters than this are OCR candidates.
pub const OCR_TEXT_THRESHOLD: usize = 50;

/// Map a user language hint onto a tesseract language list.
///
/// Any Chinese hint selects simplified Chinese plus English; an empty hint
/// selects English.
pub fn tesseract_language(hint: &str) -> String {
    let hint = hint.trim();
    if hint.contains("chi") {
        "chi_sim+eng".to_string()
    } else if hint.is_empty() {
        "eng".to_string()
    } else {
        hint.to_string()
    }
}

fn find_tesseract() -> Result<PathBuf, Pdf2DocxError> {
    which::which("tesseract").map_err(|_| Pdf2DocxError::BackendUnavailable {
        backend: "tesseract".to_string(),
        hint: "OCR was requested but tesseract is not on PATH.\n\
Install it (e.g. apt install tesseract-ocr tesseract-ocr-chi-sim) or drop --ocr."
            .to_string(),
    })
}

async fn ocr_image(
    tesseract: &Path,
    image: &Path,
    language: &str,
    timeout_secs: u64,
) -> Result<String, Pdf2DocxError> {
    let run = Command::new(tesseract)
        .arg(image)
        .arg("stdout")
        .arg("-l")
        .arg(language)
        .kill_on_drop(true)
        .output();
    let out = timeout(Duration::from_secs(timeout_secs), run)
        .await
        .map_err(|_| Pdf2DocxError::RecognitionFailed {
            backend: "tesseract".into(),
            detail: format!("timed out after {timeout_secs}s on {}", image.display()),
        })?
        .map_err(|e| Pdf2DocxError::RecognitionFailed {
            backend: "tesseract".into(),
            detail: e.to_string(),
        })?;
    if !out.status.success() {
        return Err(Pdf2DocxError::RecognitionFailed {
            backend: "tesseract".into(),
            detail: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// Build the Markdown for `pdf` without rendering it.
pub async fn direct_markdown(
    pdf: &Path,
    options: &ConvertOptions,
    config: &ConversionConfig,
) -> Result<String, Pdf2DocxError> {
    let pdf = resolve_local(pdf)?;
    let password = options.password.as_deref();
    let pages = render::extract_text(&pdf, 72, password).await?;

    let mut texts: Vec<String> = pages.iter().map(|p| p.text.clone()).collect();
    let scanned: Vec<usize> = texts
        .iter()
        .enumerate()
        .filter(|(_, t)| t.trim().chars().count() < OCR_TEXT_THRESHOLD)
        .map(|(i, _)| i)
        .collect();

    if options.use_ocr && !scanned.is_empty() {
        let tesseract = find_tesseract()?;
        let language = tesseract_language(&options.language);
        info!("OCR: {} of {} pages with '{}'", scanned.len(), pages.len(), language);

        let images = render::render_pages(&pdf, config.dpi, config.max_rendered_pixels, password).await?;
        let scratch = tempfile::tempdir().map_err(|e| Pdf2DocxError::Internal(e.to_string()))?;
        for idx in scanned {
            let Some(page) = images.get(idx) else { continue };
            let png = scratch.path().join(format!("page-{}.png", page.page_num));
            encode::write_png(&page.image, page.page_num, &png).await?;
            let text = ocr_image(&tesseract, &png, &language, config.render_timeout_secs).await?;
            debug!("Page {}: OCR read {} chars", page.page_num, text.chars().count());
            texts[idx] = text;
        }
    }

    let mut doc = StructuredDocument::new(pdf.display().to_string());
    doc.pages = pages
        .iter()
        .zip(&texts)
        .map(|(p, text)| {
            Page::new(p.page_num)
                .with_size(p.width, p.height)
                .with_blocks(paragraphs_from_text(p.page_num, text))
        })
        .collect();

    let doc = refine(doc, &config.filter);
    if doc.is_blank() {
        return Err(Pdf2DocxError::NoUsableText {
            source_name: pdf.display().to_string(),
        });
    }
    Ok(markdown::export(&doc))
}

/// Convert `pdf` straight to `output` with `renderer`.
pub async fn convert_direct(
    pdf: &Path,
    output: &Path,
    options: &ConvertOptions,
    config: &ConversionConfig,
    renderer: &dyn DocumentRenderer,
) -> Result<PathBuf, Pdf2DocxError> {
    let md = direct_markdown(pdf, options, config).await?;

    let scratch = tempfile::tempdir().map_err(|e| Pdf2DocxError::Internal(e.to_string()))?;
    let md_path = scratch.path().join("direct.md");
    tokio::fs::write(&md_path, &md)
        .await
        .map_err(|e| Pdf2DocxError::io(&md_path, e))?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Pdf2DocxError::OutputWriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    renderer.render(&md_path, output).await?;
    info!("Direct conversion written to {}", output.display());
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_hints() {
        assert_eq!(tesseract_language("chi_tra"), "chi_sim+eng");
        assert_eq!(tesseract_language("chi_sim+eng"), "chi_sim+eng");
        assert_eq!(tesseract_language(""), "eng");
        assert_eq!(tesseract_language("deu"), "deu");
    }

    #[tokio::test]
    async fn missing_pdf_is_reported_before_pdfium() {
        let err = direct_markdown(
            Path::new("/no/such/input.pdf"),
            &ConvertOptions::default(),
            &ConversionConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Pdf2DocxError::FileNotFound { .. }));
    }
}
