//! Extraction stage: PDF to raw Markdown.
//!
//! ```text
//! backend ─▶ filter_artifacts ─▶ normalize ─▶ merge_paragraphs ─▶ export
//!    │
//!    └─ unavailable / error / blank ─▶ plain-text backend ─▶ (same chain)
//! ```
//!
//! The stage fails only when both paths come back without usable text.

use crate::config::{ConversionConfig, FilterThresholds};
use crate::document::StructuredDocument;
use crate::error::Pdf2DocxError;
use crate::pipeline::llm::ChatClient;
use crate::pipeline::stage::StageOutcome;
use crate::pipeline::{filter, markdown, merge, order};
use crate::recognize::{select_backend, PlainTextBackend, RecognitionBackend};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Run the post-recognition chain on a freshly recognised document.
pub fn refine(doc: StructuredDocument, thresholds: &FilterThresholds) -> StructuredDocument {
    let doc = filter::filter_artifacts(doc, thresholds);
    let doc = order::normalize(doc);
    merge::merge_paragraphs(doc)
}

/// The structured backend plus the text-only fallback.
pub struct Extractor {
    /// `Err` holds the reason the structured backend could not be built.
    primary: Result<Arc<dyn RecognitionBackend>, String>,
    fallback: Arc<dyn RecognitionBackend>,
    thresholds: FilterThresholds,
}

impl Extractor {
    pub fn new(
        primary: Arc<dyn RecognitionBackend>,
        fallback: Arc<dyn RecognitionBackend>,
        thresholds: FilterThresholds,
    ) -> Self {
        Self {
            primary: Ok(primary),
            fallback,
            thresholds,
        }
    }

    /// Select the configured backend; when none is usable, run text-only.
    pub fn from_config(config: &ConversionConfig, client: Option<Arc<dyn ChatClient>>) -> Self {
        let primary = select_backend(config, client).map_err(|e| {
            warn!("No structured backend available, extraction will be text-only — {}", e);
            e.to_string()
        });
        Self {
            primary,
            fallback: Arc::new(PlainTextBackend::new(config.password.clone())),
            thresholds: config.filter,
        }
    }

    /// Text-only extraction, skipping the structured backend entirely.
    pub fn text_only(fallback: Arc<dyn RecognitionBackend>, thresholds: FilterThresholds) -> Self {
        Self {
            primary: Err("structured recognition disabled".to_string()),
            fallback,
            thresholds,
        }
    }

    /// Produce the refined document.
    pub async fn structure(&self, pdf: &Path) -> StageOutcome<StructuredDocument> {
        let reason = match &self.primary {
            Ok(backend) => match backend.process(pdf).await {
                Ok(doc) => {
                    let doc = refine(doc, &self.thresholds);
                    if !doc.is_blank() {
                        info!(
                            "Extraction with '{}': {} pages, {} blocks",
                            backend.name(),
                            doc.pages.len(),
                            doc.block_count()
                        );
                        return StageOutcome::Succeeded(doc);
                    }
                    format!("backend '{}' produced no text", backend.name())
                }
                Err(e) => format!("backend '{}' failed: {}", backend.name(), e),
            },
            Err(reason) => reason.clone(),
        };

        warn!("Falling back to text-only extraction — {}", reason);
        match self.fallback.process(pdf).await {
            Ok(doc) => {
                let doc = refine(doc, &self.thresholds);
                if doc.is_blank() {
                    StageOutcome::Fatal(Pdf2DocxError::NoUsableText {
                        source_name: pdf.display().to_string(),
                    })
                } else {
                    info!("Text-only extraction: {} blocks", doc.block_count());
                    StageOutcome::degraded(doc, reason)
                }
            }
            Err(e) => StageOutcome::Fatal(e),
        }
    }

    /// Produce raw Markdown.
    pub async fn run(&self, pdf: &Path) -> StageOutcome<String> {
        self.structure(pdf).await.map(|doc| markdown::export(&doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Block, BlockType, Page, UNKNOWN_BBOX};
    use async_trait::async_trait;

    enum Script {
        Text(&'static [&'static str]),
        Fail,
    }

    struct Scripted(Script);

    #[async_trait]
    impl RecognitionBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn process(&self, _pdf: &Path) -> Result<StructuredDocument, Pdf2DocxError> {
            match &self.0 {
                Script::Fail => Err(Pdf2DocxError::CorruptPdf {
                    path: "x.pdf".into(),
                    detail: "bad xref".into(),
                }),
                Script::Text(paras) => {
                    let mut doc = StructuredDocument::new("x.pdf");
                    let blocks = paras
                        .iter()
                        .enumerate()
                        .map(|(i, t)| {
                            Block::new(BlockType::Paragraph, *t, UNKNOWN_BBOX, 1)
                                .with_order(i as u32 + 1)
                        })
                        .collect();
                    doc.pages.push(Page::new(1).with_blocks(blocks));
                    Ok(doc)
                }
            }
        }
    }

    fn extractor(primary: Script, fallback: Script) -> Extractor {
        Extractor::new(
            Arc::new(Scripted(primary)),
            Arc::new(Scripted(fallback)),
            FilterThresholds::default(),
        )
    }

    #[tokio::test]
    async fn primary_success() {
        let out = extractor(Script::Text(&["Hello."]), Script::Fail)
            .run(Path::new("x.pdf"))
            .await;
        assert!(matches!(out, StageOutcome::Succeeded(ref md) if md == "Hello.\n"));
    }

    #[tokio::test]
    async fn primary_failure_degrades() {
        let out = extractor(Script::Fail, Script::Text(&["Plain text."]))
            .run(Path::new("x.pdf"))
            .await;
        assert!(out.is_degraded());
        assert_eq!(out.into_result().unwrap(), "Plain text.\n");
    }

    #[tokio::test]
    async fn blank_primary_degrades() {
        let out = extractor(Script::Text(&["   "]), Script::Text(&["Plain."]))
            .run(Path::new("x.pdf"))
            .await;
        assert!(out.is_degraded());
    }

    #[tokio::test]
    async fn both_blank_is_fatal() {
        let out = extractor(Script::Text(&[]), Script::Text(&["", "7"]))
            .run(Path::new("x.pdf"))
            .await;
        assert!(matches!(
            out,
            StageOutcome::Fatal(Pdf2DocxError::NoUsableText { .. })
        ));
    }

    #[tokio::test]
    async fn both_failing_is_fatal() {
        let out = extractor(Script::Fail, Script::Fail).run(Path::new("x.pdf")).await;
        assert!(out.is_fatal());
    }

    #[tokio::test]
    async fn text_only_goes_straight_to_fallback() {
        let ex = Extractor::text_only(
            Arc::new(Scripted(Script::Text(&["Only path."]))),
            FilterThresholds::default(),
        );
        let out = ex.run(Path::new("x.pdf")).await;
        assert!(out.is_degraded());
    }
}
