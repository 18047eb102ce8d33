//! Rendering stage: Markdown to DOCX via pandoc.
//!
//! There is no fallback format, so every failure here fails the task. A
//! render only counts when the output file exists and is non-empty.

use crate::config::ConversionConfig;
use crate::error::Pdf2DocxError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

/// Media type of the rendered artifact.
pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Converts a Markdown file into the distributable document.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    fn name(&self) -> &str;

    async fn render(&self, markdown: &Path, output: &Path) -> Result<(), Pdf2DocxError>;
}

/// Fail unless `path` is a non-empty file.
pub async fn verify_artifact(path: &Path) -> Result<u64, Pdf2DocxError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        _ => Err(Pdf2DocxError::MissingArtifact {
            path: path.to_path_buf(),
        }),
    }
}

/// Locate a pandoc binary: explicit path first, then `PATH`.
pub fn find_pandoc(configured: Option<&Path>) -> Result<PathBuf, Pdf2DocxError> {
    let unavailable = |hint: String| Pdf2DocxError::BackendUnavailable {
        backend: "pandoc".to_string(),
        hint,
    };
    match configured {
        Some(p) if p.is_file() => Ok(p.to_path_buf()),
        Some(p) => Err(unavailable(format!(
            "Configured pandoc '{}' does not exist.",
            p.display()
        ))),
        None => which::which("pandoc").map_err(|_| {
            unavailable("pandoc not found on PATH.\nInstall it from https://pandoc.org/installing.html".to_string())
        }),
    }
}

/// Renders with pandoc. The binary is located on every call.
pub struct PandocRenderer {
    pandoc_path: Option<PathBuf>,
    reference_doc: Option<PathBuf>,
    timeout_secs: u64,
}

impl PandocRenderer {
    pub fn new(pandoc_path: Option<PathBuf>, reference_doc: Option<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            pandoc_path,
            reference_doc,
            timeout_secs,
        }
    }

    pub fn from_config(config: &ConversionConfig) -> Self {
        Self::new(
            config.pandoc_path.clone(),
            config.reference_doc.clone(),
            config.render_timeout_secs,
        )
    }

    fn command(&self, binary: &Path, markdown: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(binary);
        cmd.arg(markdown)
            .arg("--from")
            .arg("markdown")
            .arg("--to")
            .arg("docx")
            .arg("-o")
            .arg(output);
        if let Some(reference) = self.reference_doc.as_deref().filter(|p| p.is_file()) {
            cmd.arg(format!("--reference-doc={}", reference.display()));
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl DocumentRenderer for PandocRenderer {
    fn name(&self) -> &str {
        "pandoc"
    }

    async fn render(&self, markdown: &Path, output: &Path) -> Result<(), Pdf2DocxError> {
        let binary = find_pandoc(self.pandoc_path.as_deref())?;
        debug!("Using pandoc at {}", binary.display());
        let mut cmd = self.command(&binary, markdown, output);
        let result = timeout(Duration::from_secs(self.timeout_secs), cmd.output())
            .await
            .map_err(|_| Pdf2DocxError::RenderTimeout {
                secs: self.timeout_secs,
            })?
            .map_err(|e| Pdf2DocxError::RenderFailed {
                detail: format!("could not start {}: {e}", binary.display()),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(Pdf2DocxError::RenderFailed {
                detail: if stderr.is_empty() {
                    format!("pandoc exited with {}", result.status)
                } else {
                    stderr
                },
            });
        }

        let size = verify_artifact(output).await?;
        info!("Rendered {} ({} bytes)", output.display(), size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configured_binary_is_unavailable() {
        let err = find_pandoc(Some(Path::new("/no/such/pandoc"))).unwrap_err();
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("/no/such/pandoc"));
    }

    #[test]
    fn reference_doc_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.docx");

        let r = PandocRenderer::new(None, Some(reference.clone()), 5);
        let pandoc = Path::new("pandoc");
        let cmd = r.command(pandoc, Path::new("in.md"), Path::new("out.docx"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(!args.iter().any(|a| a.starts_with("--reference-doc")));

        std::fs::write(&reference, b"x").unwrap();
        let cmd = r.command(pandoc, Path::new("in.md"), Path::new("out.docx"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.iter().any(|a| a.starts_with("--reference-doc=")));
        assert_eq!(&args[..2], &["in.md".to_string(), "--from".to_string()]);
    }

    #[tokio::test]
    async fn empty_artifact_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.docx");
        assert!(verify_artifact(&out).await.is_err());
        std::fs::write(&out, b"").unwrap();
        assert!(matches!(
            verify_artifact(&out).await,
            Err(Pdf2DocxError::MissingArtifact { .. })
        ));
        std::fs::write(&out, b"PK").unwrap();
        assert_eq!(verify_artifact(&out).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn missing_pandoc_fails_the_render() {
        let r = PandocRenderer::new(Some("/no/such/pandoc".into()), None, 5);
        let err = r
            .render(Path::new("in.md"), Path::new("out.docx"))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn failing_binary_is_render_failed() {
        // `false` exits non-zero without output on any Unix.
        let Ok(bin) = which::which("false") else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let r = PandocRenderer::new(Some(bin), None, 5);
        let err = r
            .render(&dir.path().join("in.md"), &dir.path().join("out.docx"))
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2DocxError::RenderFailed { .. }));
    }
}
