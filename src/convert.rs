//! In-process conversion entry points.
//!
//! These run extraction and enhancement inline and return the result, for
//! library callers and the CLI. The task-based API with background workers
//! lives in [`crate::service`]; both share the same stages.

use crate::config::ConversionConfig;
use crate::document::StructuredDocument;
use crate::error::Pdf2DocxError;
use crate::pipeline::docx::{DocumentRenderer, PandocRenderer};
use crate::pipeline::enhance::Enhancer;
use crate::pipeline::extract::Extractor;
use crate::pipeline::llm::{resolve_chat_client, ChatClient, RetryPolicy};
use crate::pipeline::stage::StageOutcome;
use crate::pipeline::{input, markdown, render};
use crate::pipeline::render::DocumentInfo;
use crate::progress::Stage;
use crate::study;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What [`convert`] produces.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// The refined document model.
    pub document: StructuredDocument,
    /// Markdown exported from `document`.
    pub raw_markdown: String,
    /// Enhanced Markdown, or `raw_markdown` when enhancement degraded.
    pub markdown: String,
    /// Stages that fell back, with the reason.
    pub degraded: Vec<(Stage, String)>,
    pub duration_ms: u64,
}

/// Output formats for [`convert_to_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Markdown,
    /// The structured document model as pretty JSON.
    Json,
    Docx,
    /// Study notebook with `questions` generated questions per chapter.
    Notebook { questions: usize },
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
            OutputFormat::Docx => "docx",
            OutputFormat::Notebook { .. } => "ipynb",
        }
    }
}

fn optional_client(config: &ConversionConfig) -> Option<Arc<dyn ChatClient>> {
    match resolve_chat_client(config) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("No LLM provider available — {}", e);
            None
        }
    }
}

fn settle<T>(stage: Stage, outcome: StageOutcome<T>, degraded: &mut Vec<(Stage, String)>) -> Result<T, Pdf2DocxError> {
    match outcome {
        StageOutcome::Succeeded(v) => Ok(v),
        StageOutcome::Degraded { value, reason } => {
            degraded.push((stage, reason));
            Ok(value)
        }
        StageOutcome::Fatal(e) => Err(e),
    }
}

async fn run(
    input_str: &str,
    config: &ConversionConfig,
    client: Option<Arc<dyn ChatClient>>,
) -> Result<ConversionOutput, Pdf2DocxError> {
    let start = Instant::now();
    info!("Starting conversion: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let mut degraded = Vec::new();

    let extractor = Extractor::from_config(config, client.clone());
    let document = settle(
        Stage::Extraction,
        extractor.structure(resolved.path()).await,
        &mut degraded,
    )?;
    let raw_markdown = markdown::export(&document);

    let enhancer = Enhancer::new(client, config);
    let markdown = settle(
        Stage::Enhancement,
        enhancer.run(&raw_markdown).await,
        &mut degraded,
    )?;

    let duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Converted {} pages, {} blocks in {}ms",
        document.pages.len(),
        document.block_count(),
        duration_ms
    );
    Ok(ConversionOutput {
        document,
        raw_markdown,
        markdown,
        degraded,
        duration_ms,
    })
}

/// Convert a PDF file or URL to structured Markdown.
///
/// Recognition falls back to text-only extraction and enhancement to an
/// identity copy; both are reported in [`ConversionOutput::degraded`].
///
/// # Errors
/// Input errors, and [`Pdf2DocxError::NoUsableText`] (or the text-only
/// path's own error) when neither extraction path yields text.
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2DocxError> {
    run(input_str.as_ref(), config, optional_client(config)).await
}

/// Recognise and refine only: no enhancement, no rendering.
///
/// Serialise the result with [`StructuredDocument::to_json`] for the
/// structured JSON artifact.
pub async fn structure(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<StructuredDocument, Pdf2DocxError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    Extractor::from_config(config, optional_client(config))
        .structure(resolved.path())
        .await
        .into_result()
}

/// [`convert`], returning only the final Markdown.
pub async fn to_markdown(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<String, Pdf2DocxError> {
    convert(input_str, config).await.map(|o| o.markdown)
}

/// Synchronous wrapper around [`convert`].
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2DocxError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2DocxError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(input_str, config))
}

/// Convert PDF bytes held in memory.
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2DocxError> {
    input::validate_upload(bytes, None, config.max_upload_bytes)?;
    input::check_magic("upload", bytes)?;
    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| Pdf2DocxError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| Pdf2DocxError::io(tmp.path(), e))?;
    let path = tmp.path().to_string_lossy().to_string();
    convert(&path, config).await
}

/// Page count and document metadata; no recognition, no model.
pub async fn inspect(
    input_str: impl AsRef<str>,
    password: Option<&str>,
) -> Result<DocumentInfo, Pdf2DocxError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    render::extract_metadata(resolved.path(), password).await
}

/// Write `bytes` next to `path` and rename it into place.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Pdf2DocxError> {
    let failed = |source| Pdf2DocxError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(failed)?;
    }
    let tmp = path.with_extension("part");
    tokio::fs::write(&tmp, bytes).await.map_err(failed)?;
    tokio::fs::rename(&tmp, path).await.map_err(failed)
}

/// Convert a PDF and write it to `output_path` in `format`.
///
/// DOCX output is rendered with pandoc; a rendering failure is returned
/// as-is since there is no other format to fall back to.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    format: OutputFormat,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2DocxError> {
    let renderer = PandocRenderer::from_config(config);
    convert_to_file_with(input_str, output_path, format, config, &renderer).await
}

/// [`convert_to_file`] with an explicit renderer.
pub async fn convert_to_file_with(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    format: OutputFormat,
    config: &ConversionConfig,
    renderer: &dyn DocumentRenderer,
) -> Result<ConversionOutput, Pdf2DocxError> {
    let path = output_path.as_ref();
    let client = optional_client(config);
    let output = run(input_str.as_ref(), config, client.clone()).await?;

    match format {
        OutputFormat::Markdown => write_atomic(path, output.markdown.as_bytes()).await?,
        OutputFormat::Json => write_atomic(path, output.document.to_json()?.as_bytes()).await?,
        OutputFormat::Docx => render_docx(&output.markdown, path, renderer).await?,
        OutputFormat::Notebook { questions } => {
            let title = title_for(path, &output.document);
            let mut chapters = study::extract_chapters(&output.markdown, &title);
            match (&client, questions) {
                (Some(client), n) if n > 0 => {
                    study::generate_questions(
                        client.as_ref(),
                        &mut chapters,
                        n,
                        RetryPolicy::from_config(config),
                        config.max_tokens,
                    )
                    .await
                }
                (None, n) if n > 0 => warn!("No LLM provider: notebook will have no questions"),
                _ => {}
            }
            let nb = study::build_notebook(&title, &chapters);
            let json = serde_json::to_string_pretty(&nb)
                .map_err(|e| Pdf2DocxError::Internal(format!("serialise notebook: {e}")))?;
            write_atomic(path, json.as_bytes()).await?;
        }
    }
    info!("Wrote {}", path.display());
    Ok(output)
}

async fn render_docx(md: &str, path: &Path, renderer: &dyn DocumentRenderer) -> Result<(), Pdf2DocxError> {
    let scratch = tempfile::tempdir().map_err(|e| Pdf2DocxError::Internal(e.to_string()))?;
    let md_path = scratch.path().join("document.md");
    tokio::fs::write(&md_path, md)
        .await
        .map_err(|e| Pdf2DocxError::io(&md_path, e))?;
    let staged: PathBuf = scratch.path().join("document.docx");
    renderer.render(&md_path, &staged).await?;
    let bytes = tokio::fs::read(&staged)
        .await
        .map_err(|e| Pdf2DocxError::io(&staged, e))?;
    write_atomic(path, &bytes).await
}

fn title_for(path: &Path, doc: &StructuredDocument) -> String {
    doc.blocks()
        .find(|b| b.block_type == crate::document::BlockType::Title && !b.text.trim().is_empty())
        .map(|b| b.text.trim().to_string())
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "Document".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Block, BlockType, Page, UNKNOWN_BBOX};

    #[test]
    fn extensions() {
        assert_eq!(OutputFormat::Docx.extension(), "docx");
        assert_eq!(OutputFormat::Notebook { questions: 2 }.extension(), "ipynb");
    }

    #[test]
    fn title_prefers_title_block() {
        let mut doc = StructuredDocument::new("x.pdf");
        doc.pages.push(Page::new(1).with_blocks(vec![
            Block::new(BlockType::Paragraph, "intro", UNKNOWN_BBOX, 1),
            Block::new(BlockType::Title, "Algebra I", UNKNOWN_BBOX, 1),
        ]));
        assert_eq!(title_for(Path::new("out/book.ipynb"), &doc), "Algebra I");
        assert_eq!(
            title_for(Path::new("out/book.ipynb"), &StructuredDocument::new("x")),
            "book"
        );
    }

    #[tokio::test]
    async fn atomic_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/out.md");
        write_atomic(&path, b"# Hi\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Hi\n");
        assert!(!path.with_extension("part").exists());
    }

    #[tokio::test]
    async fn bytes_without_magic_are_rejected() {
        let err = convert_from_bytes(b"hello", &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2DocxError::NotAPdf { .. }));
    }
}
