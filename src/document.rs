//! The structured document model shared by every pipeline stage.
//!
//! Recognition backends produce a [`StructuredDocument`]; the filter, order
//! and merge stages each consume one and return a new one; the Markdown
//! exporter renders it. Serialising it gives the structured JSON artifact:
//!
//! ```json
//! {"source": "scan.pdf", "pages": [{"page_num": 1, "blocks": [
//!   {"type": "title", "bbox": [10.0, 20.0, 300.0, 60.0], "text": "Chapter 1",
//!    "order": 1, "page_num": 1}
//! ]}]}
//! ```

use crate::error::Pdf2DocxError;
use serde::{Deserialize, Serialize};

/// Semantic type of a [`Block`], serialised as its snake_case tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Title,
    Section,
    Paragraph,
    Table,
    Header,
    Footer,
    PageNumber,
    ListItem,
    Figure,
    Caption,
    Footnote,
    Formula,
}

impl BlockType {
    /// The string tag used in the JSON artifact.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Title => "title",
            BlockType::Section => "section",
            BlockType::Paragraph => "paragraph",
            BlockType::Table => "table",
            BlockType::Header => "header",
            BlockType::Footer => "footer",
            BlockType::PageNumber => "page_number",
            BlockType::ListItem => "list_item",
            BlockType::Figure => "figure",
            BlockType::Caption => "caption",
            BlockType::Footnote => "footnote",
            BlockType::Formula => "formula",
        }
    }

    /// Header, footer and page-number blocks are page furniture, never content.
    pub fn is_page_furniture(&self) -> bool {
        matches!(
            self,
            BlockType::Header | BlockType::Footer | BlockType::PageNumber
        )
    }
}

/// `[x1, y1, x2, y2]` in page-pixel coordinates, origin at the top-left.
pub type BBox = [f64; 4];

/// The "position unknown" sentinel.
pub const UNKNOWN_BBOX: BBox = [0.0; 4];

/// Structured payload carried alongside a block's text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockExtra {
    /// Table cells, first row is the header.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<Vec<String>>,
}

/// Atomic content unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub bbox: BBox,
    #[serde(default)]
    pub text: String,
    /// Provisional until normalised, then globally dense (1..N).
    pub order: u32,
    /// 1-based.
    pub page_num: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<BlockExtra>,
}

impl Block {
    pub fn new(block_type: BlockType, text: impl Into<String>, bbox: BBox, page_num: u32) -> Self {
        Self {
            block_type,
            bbox,
            text: text.into(),
            order: 0,
            page_num,
            extra: None,
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn with_rows(mut self, rows: Vec<Vec<String>>) -> Self {
        self.extra = Some(BlockExtra { rows });
        self
    }

    /// Table rows, if any were recognised.
    pub fn rows(&self) -> Option<&[Vec<String>]> {
        self.extra
            .as_ref()
            .map(|e| e.rows.as_slice())
            .filter(|rows| !rows.is_empty())
    }

    /// True when the block carries the `[0,0,0,0]` sentinel.
    pub fn has_unknown_position(&self) -> bool {
        self.bbox == UNKNOWN_BBOX
    }
}

/// One physical page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub page_num: u32,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl Page {
    pub fn new(page_num: u32) -> Self {
        Self {
            page_num,
            blocks: Vec::new(),
            width: None,
            height: None,
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.blocks = blocks;
        self
    }

    /// Page height, when known and usable for position heuristics.
    pub fn known_height(&self) -> Option<f64> {
        self.height.filter(|h| h.is_finite() && *h > 0.0)
    }
}

/// Ordered pages plus the identifier of where they came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub source: String,
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl StructuredDocument {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            pages: Vec::new(),
        }
    }

    /// All blocks in page order, then in-page order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.pages.iter().flat_map(|p| p.blocks.iter())
    }

    pub fn block_count(&self) -> usize {
        self.pages.iter().map(|p| p.blocks.len()).sum()
    }

    /// True when no block carries any non-whitespace text or table rows.
    pub fn is_blank(&self) -> bool {
        self.blocks()
            .all(|b| b.text.trim().is_empty() && b.rows().is_none())
    }

    pub fn to_json(&self) -> Result<String, Pdf2DocxError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Pdf2DocxError::Internal(format!("serialise document: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self, Pdf2DocxError> {
        serde_json::from_str(json)
            .map_err(|e| Pdf2DocxError::InvalidConfig(format!("structured JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_type_serialises_as_tag() {
        let json = serde_json::to_string(&BlockType::PageNumber).unwrap();
        assert_eq!(json, "\"page_number\"");
        assert_eq!(BlockType::ListItem.as_str(), "list_item");
    }

    #[test]
    fn json_artifact_field_names_are_stable() {
        let mut doc = StructuredDocument::new("scan.pdf");
        doc.pages.push(Page::new(1).with_blocks(vec![Block::new(
            BlockType::Title,
            "Chapter 1",
            [10.0, 20.0, 300.0, 60.0],
            1,
        )
        .with_order(1)]));

        let value: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        let block = &value["pages"][0]["blocks"][0];
        assert_eq!(value["source"], "scan.pdf");
        assert_eq!(value["pages"][0]["page_num"], 1);
        assert_eq!(block["type"], "title");
        assert_eq!(block["text"], "Chapter 1");
        assert_eq!(block["order"], 1);
        assert_eq!(block["page_num"], 1);
        assert_eq!(block["bbox"][2], 300.0);
        assert!(block.get("extra").is_none());
    }

    #[test]
    fn table_rows_survive_json() {
        let mut doc = StructuredDocument::new("t.pdf");
        doc.pages.push(Page::new(1).with_blocks(vec![Block::new(
            BlockType::Table,
            "",
            UNKNOWN_BBOX,
            1,
        )
        .with_rows(vec![vec!["a".into(), "b".into()]])]));

        let back = StructuredDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(back, doc);
        assert!(!back.is_blank());
    }

    #[test]
    fn unknown_height_is_ignored() {
        assert_eq!(Page::new(1).known_height(), None);
        assert_eq!(Page::new(1).with_size(10.0, 0.0).known_height(), None);
        assert_eq!(Page::new(1).with_size(10.0, 800.0).known_height(), Some(800.0));
    }

    #[test]
    fn blank_document() {
        let mut doc = StructuredDocument::new("x");
        assert!(doc.is_blank());
        doc.pages.push(Page::new(1).with_blocks(vec![Block::new(
            BlockType::Paragraph,
            "  \n",
            UNKNOWN_BBOX,
            1,
        )]));
        assert!(doc.is_blank());
    }
}
