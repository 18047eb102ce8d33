//! Recognition backends: PDF in, [`StructuredDocument`] out.
//!
//! Every backend implements [`RecognitionBackend`]. Which one runs is a
//! configuration choice ([`BackendKind`]); [`select_backend`] resolves an
//! unavailable alternate to the primary layout backend at selection time, and
//! wraps available alternates so that a runtime "not installed" failure also
//! lands on the primary instead of aborting.
//!
//! ```text
//! Layout     render ─┬─ layout pass ──┐
//!                    └─ line pass ────┴─ geometric merge ─▶ blocks
//! Structure  render ─── typed-block pass (tables with rows) ─▶ blocks
//! TextLayer  pdfium text runs ─ line/block grouping ─▶ blocks
//! PlainText  pdfium page text ─ blank-line split ─▶ paragraphs
//! ```

pub mod layout;
pub mod structure;
pub mod text_layer;
pub mod vision;

use crate::config::{BackendKind, ConversionConfig};
use crate::document::StructuredDocument;
use crate::error::Pdf2DocxError;
use crate::pipeline::llm::ChatClient;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub use layout::{LayoutBackend, LayoutDetector, LayoutRegion, LineRecognizer, TextLine};
pub use structure::StructureBackend;
pub use text_layer::{PlainTextBackend, TextLayerBackend};
pub use vision::{VisionLayoutDetector, VisionLineRecognizer};

/// Uniform contract over interchangeable recognition backends.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Short label for logs and errors.
    fn name(&self) -> &str;

    /// Cheap check that runtime dependencies are present.
    fn check_available(&self) -> Result<(), Pdf2DocxError> {
        Ok(())
    }

    /// Recognise every page of `pdf`.
    ///
    /// Fails with `FileNotFound` when `pdf` is absent and with
    /// `BackendUnavailable` when a runtime dependency is missing.
    async fn process(&self, pdf: &Path) -> Result<StructuredDocument, Pdf2DocxError>;
}

/// Fail early with the input-error variants when `path` cannot be read.
pub fn ensure_exists(path: &Path) -> Result<(), Pdf2DocxError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(Pdf2DocxError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(Pdf2DocxError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(Pdf2DocxError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

fn no_model(kind: BackendKind) -> Pdf2DocxError {
    Pdf2DocxError::BackendUnavailable {
        backend: kind.name().to_string(),
        hint: "No vision model is configured.\n\
Set OPENAI_API_KEY (or another provider key), or pass --provider/--model."
            .to_string(),
    }
}

/// Construct the backend for `kind`.
///
/// Model-backed kinds need `client`; without one they are unavailable.
pub fn build_backend(
    kind: BackendKind,
    config: &ConversionConfig,
    client: Option<Arc<dyn ChatClient>>,
) -> Result<Arc<dyn RecognitionBackend>, Pdf2DocxError> {
    let backend: Arc<dyn RecognitionBackend> = match kind {
        BackendKind::Layout => {
            let client = client.ok_or_else(|| no_model(kind))?;
            Arc::new(LayoutBackend::new(
                Arc::new(VisionLayoutDetector::new(Arc::clone(&client), config)),
                Arc::new(VisionLineRecognizer::new(client, config)),
                config,
            ))
        }
        BackendKind::Structure => {
            let client = client.ok_or_else(|| no_model(kind))?;
            Arc::new(StructureBackend::new(client, config))
        }
        BackendKind::TextLayer => {
            Arc::new(TextLayerBackend::new(config.dpi, config.password.clone()))
        }
    };
    backend.check_available()?;
    Ok(backend)
}

/// Resolve the configured backend, falling back to the primary one.
pub fn select_backend(
    config: &ConversionConfig,
    client: Option<Arc<dyn ChatClient>>,
) -> Result<Arc<dyn RecognitionBackend>, Pdf2DocxError> {
    let kind = config.backend;
    if kind == BackendKind::Layout {
        return build_backend(kind, config, client);
    }

    let primary = build_backend(BackendKind::Layout, config, client.clone());
    match build_backend(kind, config, client) {
        Ok(requested) => match primary {
            Ok(primary) => Ok(Arc::new(WithFallback { requested, primary })),
            Err(_) => Ok(requested),
        },
        Err(e) if e.is_unavailable() => {
            warn!("Backend '{}' unavailable, using '{}' — {}", kind.name(), BackendKind::Layout.name(), e);
            primary
        }
        Err(e) => Err(e),
    }
}

/// Runs `requested`; when it reports a missing dependency, runs `primary`.
pub struct WithFallback {
    pub requested: Arc<dyn RecognitionBackend>,
    pub primary: Arc<dyn RecognitionBackend>,
}

#[async_trait]
impl RecognitionBackend for WithFallback {
    fn name(&self) -> &str {
        self.requested.name()
    }

    async fn process(&self, pdf: &Path) -> Result<StructuredDocument, Pdf2DocxError> {
        match self.requested.process(pdf).await {
            Err(e) if e.is_unavailable() => {
                warn!(
                    "Backend '{}' unavailable at run time, using '{}' — {}",
                    self.requested.name(),
                    self.primary.name(),
                    e
                );
                self.primary.process(pdf).await
            }
            other => {
                info!("Backend '{}' finished", self.requested.name());
                other
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use crate::pipeline::llm::ChatRequest;

    struct Stub {
        name: &'static str,
        unavailable: bool,
    }

    #[async_trait]
    impl RecognitionBackend for Stub {
        fn name(&self) -> &str {
            self.name
        }

        async fn process(&self, _pdf: &Path) -> Result<StructuredDocument, Pdf2DocxError> {
            if self.unavailable {
                Err(Pdf2DocxError::BackendUnavailable {
                    backend: self.name.into(),
                    hint: "not installed".into(),
                })
            } else {
                Ok(StructuredDocument::new(self.name))
            }
        }
    }

    struct NullClient;

    #[async_trait]
    impl ChatClient for NullClient {
        fn name(&self) -> &str {
            "null"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<String, CallError> {
            Err(CallError::EmptyReply)
        }
    }

    #[tokio::test]
    async fn runtime_unavailability_uses_primary() {
        let b = WithFallback {
            requested: Arc::new(Stub {
                name: "structure",
                unavailable: true,
            }),
            primary: Arc::new(Stub {
                name: "layout",
                unavailable: false,
            }),
        };
        let doc = b.process(Path::new("x.pdf")).await.unwrap();
        assert_eq!(doc.source, "layout");
    }

    #[tokio::test]
    async fn available_alternate_runs_itself() {
        let b = WithFallback {
            requested: Arc::new(Stub {
                name: "structure",
                unavailable: false,
            }),
            primary: Arc::new(Stub {
                name: "layout",
                unavailable: false,
            }),
        };
        assert_eq!(b.process(Path::new("x.pdf")).await.unwrap().source, "structure");
    }

    #[test]
    fn model_backends_need_a_client() {
        let config = ConversionConfig::default();
        let err = build_backend(BackendKind::Layout, &config, None).err().unwrap();
        assert!(err.is_unavailable());
    }

    #[test]
    fn alternate_with_client_selected() {
        let config = ConversionConfig::builder()
            .backend(BackendKind::Structure)
            .build()
            .unwrap();
        let backend = select_backend(&config, Some(Arc::new(NullClient))).unwrap();
        assert_eq!(backend.name(), "structure");
    }

    #[test]
    fn missing_file() {
        let err = ensure_exists(Path::new("/no/such/file.pdf")).unwrap_err();
        assert!(matches!(err, Pdf2DocxError::FileNotFound { .. }));
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_exists(dir.path()).is_err());
    }
}
