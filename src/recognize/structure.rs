//! Structure-oriented alternate backend.
//!
//! One vision pass per page returns typed blocks directly, with table cells
//! as rows. Its vocabulary is small (`title`, `text`, `table`, `figure`,
//! `list`); anything else is treated as text.

use crate::config::ConversionConfig;
use crate::document::{BBox, Block, BlockType, Page, StructuredDocument, UNKNOWN_BBOX};
use crate::error::Pdf2DocxError;
use crate::pipeline::llm::{chat_with_retry, ChatClient, ChatRequest, RetryPolicy};
use crate::pipeline::render::{self, PageImage};
use crate::pipeline::encode;
use crate::prompts::STRUCTURE_PROMPT;
use crate::recognize::vision::parse_json_array;
use crate::recognize::{ensure_exists, RecognitionBackend};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct RawBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    bbox: Option<BBox>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

/// Map the structure vocabulary onto block types.
pub fn block_type_for_kind(kind: &str) -> BlockType {
    match kind.trim().to_ascii_lowercase().as_str() {
        "title" => BlockType::Title,
        "table" => BlockType::Table,
        "figure" => BlockType::Figure,
        "list" => BlockType::ListItem,
        _ => BlockType::Paragraph,
    }
}

fn cell_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Turn one page's reply into a page.
fn page_from_reply(page: &PageImage, reply: &str, placeholder: &str) -> Result<Page, Pdf2DocxError> {
    let raw: Vec<RawBlock> =
        parse_json_array(reply).ok_or_else(|| Pdf2DocxError::RecognitionFailed {
            backend: "structure".into(),
            detail: format!("page {}: reply is not a JSON array", page.page_num),
        })?;

    let blocks = raw
        .into_iter()
        .enumerate()
        .map(|(i, rb)| {
            let block_type = block_type_for_kind(&rb.kind);
            let mut text = rb.text.trim().to_string();
            if text.is_empty() && block_type == BlockType::Figure {
                text = placeholder.to_string();
            }
            let mut block = Block::new(
                block_type,
                text,
                rb.bbox.unwrap_or(UNKNOWN_BBOX),
                page.page_num,
            )
            .with_order(i as u32 + 1);
            if block_type == BlockType::Table && !rb.rows.is_empty() {
                block = block.with_rows(
                    rb.rows
                        .iter()
                        .map(|row| row.iter().map(cell_text).collect())
                        .collect(),
                );
            }
            block
        })
        .collect();

    Ok(Page::new(page.page_num)
        .with_size(page.width(), page.height())
        .with_blocks(blocks))
}

/// Table/structure-oriented recognition backend.
pub struct StructureBackend {
    client: Arc<dyn ChatClient>,
    policy: RetryPolicy,
    config: ConversionConfig,
}

impl StructureBackend {
    pub fn new(client: Arc<dyn ChatClient>, config: &ConversionConfig) -> Self {
        Self {
            client,
            policy: RetryPolicy::from_config(config),
            config: config.clone(),
        }
    }

    async fn recognize_page(&self, page: PageImage) -> Result<Page, Pdf2DocxError> {
        let request = ChatRequest {
            system: STRUCTURE_PROMPT.to_string(),
            user: String::new(),
            images: vec![encode::to_image_data(&page.image, page.page_num)?],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let reply = chat_with_retry(self.client.as_ref(), &request, self.policy)
            .await
            .map_err(|e| Pdf2DocxError::RecognitionFailed {
                backend: "structure".into(),
                detail: format!("page {}: {e}", page.page_num),
            })?;
        page_from_reply(&page, &reply, &self.config.figure_placeholder)
    }

    /// Recognise already-rasterised pages.
    pub async fn recognize_pages(
        &self,
        source: &str,
        pages: Vec<PageImage>,
    ) -> Result<StructuredDocument, Pdf2DocxError> {
        let results: Vec<Result<Page, Pdf2DocxError>> = stream::iter(pages)
            .map(|p| self.recognize_page(p))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;
        let mut doc = StructuredDocument::new(source);
        doc.pages = results.into_iter().collect::<Result<_, _>>()?;
        Ok(doc)
    }
}

#[async_trait]
impl RecognitionBackend for StructureBackend {
    fn name(&self) -> &str {
        "structure"
    }

    async fn process(&self, pdf: &Path) -> Result<StructuredDocument, Pdf2DocxError> {
        ensure_exists(pdf)?;
        let pages = render::render_pages(
            pdf,
            self.config.dpi,
            self.config.max_rendered_pixels,
            self.config.password.as_deref(),
        )
        .await?;
        info!("Structure backend: recognising {} pages", pages.len());
        self.recognize_pages(&pdf.display().to_string(), pages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> PageImage {
        PageImage {
            page_num: 2,
            image: image::DynamicImage::new_rgb8(100, 200),
        }
    }

    #[test]
    fn vocabulary() {
        assert_eq!(block_type_for_kind("Title"), BlockType::Title);
        assert_eq!(block_type_for_kind("list"), BlockType::ListItem);
        assert_eq!(block_type_for_kind("equation"), BlockType::Paragraph);
    }

    #[test]
    fn table_rows_are_stringified() {
        let reply = r#"[
            {"type": "title", "bbox": [0, 0, 50, 10], "text": "Prices"},
            {"type": "table", "bbox": [0, 20, 90, 80], "text": "", "rows": [["item", "cost"], ["tea", 3]]},
            {"type": "figure", "text": ""}
        ]"#;
        let p = page_from_reply(&page(), reply, "[image]").unwrap();
        assert_eq!(p.blocks.len(), 3);
        assert_eq!(p.height, Some(200.0));
        assert_eq!(
            p.blocks[1].rows().unwrap(),
            &[vec!["item".to_string(), "cost".to_string()], vec!["tea".to_string(), "3".to_string()]]
        );
        assert_eq!(p.blocks[2].text, "[image]");
        assert!(p.blocks[2].has_unknown_position());
        assert_eq!(p.blocks[2].order, 3);
        assert!(p.blocks.iter().all(|b| b.page_num == 2));
    }

    #[test]
    fn prose_reply_is_an_error() {
        assert!(page_from_reply(&page(), "sorry", "[image]").is_err());
    }
}
