//! Primary backend: a layout pass and a text-line pass, merged geometrically.
//!
//! Each page is rasterised once and handed to two independent models. The
//! layout pass yields labelled regions; the line pass yields positioned text
//! lines. A line belongs to a region when its centre lies inside the region
//! expanded by 10% of the region's width and height. Matched lines are
//! joined top to bottom with `\n`.
//!
//! When the layout pass yields nothing (failure or a degenerate page) every
//! recognised line becomes its own paragraph, in detection order.

use crate::config::ConversionConfig;
use crate::document::{BBox, Block, BlockType, Page, StructuredDocument};
use crate::error::Pdf2DocxError;
use crate::pipeline::render::{self, PageImage};
use crate::recognize::{ensure_exists, RecognitionBackend};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fraction of a region's size added on each side when matching line centres.
pub const MATCH_TOLERANCE: f64 = 0.1;

/// A labelled region from the layout pass.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayoutRegion {
    pub label: String,
    pub bbox: BBox,
    /// Detector's reading index; regions without one sort last.
    #[serde(default)]
    pub position: Option<u32>,
}

/// A positioned text line from the line pass.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub bbox: BBox,
}

/// Produces labelled regions for a page image.
#[async_trait]
pub trait LayoutDetector: Send + Sync {
    async fn detect(&self, page: &PageImage) -> Result<Vec<LayoutRegion>, Pdf2DocxError>;
}

/// Produces positioned text lines for a page image.
#[async_trait]
pub trait LineRecognizer: Send + Sync {
    async fn recognize(&self, page: &PageImage) -> Result<Vec<TextLine>, Pdf2DocxError>;
}

// ── Label table ──────────────────────────────────────────────────────────────

/// Map a layout label to a block type. Unknown labels become paragraphs.
///
/// Matching ignores case and treats `_` and spaces like `-`.
pub fn block_type_for_label(label: &str) -> BlockType {
    let key = label.trim().to_ascii_lowercase().replace(['_', ' '], "-");
    match key.as_str() {
        "title" => BlockType::Title,
        "page-header" => BlockType::Header,
        "page-footer" => BlockType::Footer,
        "section-header" => BlockType::Section,
        "text" | "text-inline-math" | "table-of-contents" | "handwriting" => BlockType::Paragraph,
        "table" | "form" => BlockType::Table,
        "figure" | "picture" => BlockType::Figure,
        "caption" => BlockType::Caption,
        "footnote" => BlockType::Footnote,
        "formula" => BlockType::Formula,
        "list-item" => BlockType::ListItem,
        _ => BlockType::Paragraph,
    }
}

// ── Geometry ─────────────────────────────────────────────────────────────────

fn center(b: &BBox) -> (f64, f64) {
    ((b[0] + b[2]) / 2.0, (b[1] + b[3]) / 2.0)
}

/// Whether `point` lies inside `region` grown by `tol` of its width/height.
pub fn contains_with_tolerance(region: &BBox, point: (f64, f64), tol: f64) -> bool {
    let w = region[2] - region[0];
    let h = region[3] - region[1];
    let (x, y) = point;
    region[0] - w * tol <= x
        && x <= region[2] + w * tol
        && region[1] - h * tol <= y
        && y <= region[3] + h * tol
}

/// Build one page from the two passes.
pub fn assemble_page(
    page_num: u32,
    width: f64,
    height: f64,
    mut regions: Vec<LayoutRegion>,
    lines: &[TextLine],
    figure_placeholder: &str,
) -> Page {
    let page = Page::new(page_num).with_size(width, height);

    if regions.is_empty() {
        let blocks = lines
            .iter()
            .filter(|l| !l.text.trim().is_empty())
            .enumerate()
            .map(|(i, l)| {
                Block::new(BlockType::Paragraph, l.text.trim(), l.bbox, page_num)
                    .with_order(i as u32 + 1)
            })
            .collect();
        return page.with_blocks(blocks);
    }

    regions.sort_by(|a, b| {
        a.position
            .unwrap_or(u32::MAX)
            .cmp(&b.position.unwrap_or(u32::MAX))
            .then_with(|| a.bbox[1].total_cmp(&b.bbox[1]))
    });

    let blocks = regions
        .iter()
        .enumerate()
        .map(|(i, region)| {
            let block_type = block_type_for_label(&region.label);
            let mut matched: Vec<&TextLine> = lines
                .iter()
                .filter(|l| !l.text.trim().is_empty())
                .filter(|l| contains_with_tolerance(&region.bbox, center(&l.bbox), MATCH_TOLERANCE))
                .collect();
            matched.sort_by(|a, b| a.bbox[1].total_cmp(&b.bbox[1]));
            let mut text = matched
                .iter()
                .map(|l| l.text.trim())
                .collect::<Vec<_>>()
                .join("\n");
            if text.is_empty() && block_type == BlockType::Figure {
                text = figure_placeholder.to_string();
            }
            Block::new(block_type, text, region.bbox, page_num).with_order(i as u32 + 1)
        })
        .collect();

    page.with_blocks(blocks)
}

// ── Backend ──────────────────────────────────────────────────────────────────

/// Layout + text-line recognition over rasterised pages.
pub struct LayoutBackend {
    detector: Arc<dyn LayoutDetector>,
    recognizer: Arc<dyn LineRecognizer>,
    dpi: u32,
    max_pixels: u32,
    password: Option<String>,
    figure_placeholder: String,
    concurrency: usize,
}

impl LayoutBackend {
    pub fn new(
        detector: Arc<dyn LayoutDetector>,
        recognizer: Arc<dyn LineRecognizer>,
        config: &ConversionConfig,
    ) -> Self {
        Self {
            detector,
            recognizer,
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            figure_placeholder: config.figure_placeholder.clone(),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Recognise already-rasterised pages.
    pub async fn recognize_pages(
        &self,
        source: &str,
        pages: Vec<PageImage>,
    ) -> Result<StructuredDocument, Pdf2DocxError> {
        let results: Vec<Result<Page, Pdf2DocxError>> = stream::iter(pages)
            .map(|image| self.recognize_page(image))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut doc = StructuredDocument::new(source);
        for page in results {
            doc.pages.push(page?);
        }
        Ok(doc)
    }

    async fn recognize_page(&self, image: PageImage) -> Result<Page, Pdf2DocxError> {
        let (layout, lines) = tokio::join!(
            self.detector.detect(&image),
            self.recognizer.recognize(&image)
        );

        let regions = layout.unwrap_or_else(|e| {
            warn!(
                "Page {}: layout pass failed, using text lines only — {}",
                image.page_num, e
            );
            Vec::new()
        });
        let lines = lines?;
        debug!(
            "Page {}: {} regions, {} lines",
            image.page_num,
            regions.len(),
            lines.len()
        );

        Ok(assemble_page(
            image.page_num,
            image.width(),
            image.height(),
            regions,
            &lines,
            &self.figure_placeholder,
        ))
    }
}

#[async_trait]
impl RecognitionBackend for LayoutBackend {
    fn name(&self) -> &str {
        "layout"
    }

    async fn process(&self, pdf: &Path) -> Result<StructuredDocument, Pdf2DocxError> {
        ensure_exists(pdf)?;
        let pages =
            render::render_pages(pdf, self.dpi, self.max_pixels, self.password.as_deref()).await?;
        info!("Layout backend: recognising {} pages", pages.len());
        self.recognize_pages(&pdf.display().to_string(), pages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(label: &str, bbox: BBox, position: u32) -> LayoutRegion {
        LayoutRegion {
            label: label.into(),
            bbox,
            position: Some(position),
        }
    }

    fn line(text: &str, bbox: BBox) -> TextLine {
        TextLine {
            text: text.into(),
            bbox,
        }
    }

    #[test]
    fn label_table() {
        assert_eq!(block_type_for_label("Page-header"), BlockType::Header);
        assert_eq!(block_type_for_label("Page-footer"), BlockType::Footer);
        assert_eq!(block_type_for_label("Section-header"), BlockType::Section);
        assert_eq!(block_type_for_label("Text-inline-math"), BlockType::Paragraph);
        assert_eq!(block_type_for_label("Picture"), BlockType::Figure);
        assert_eq!(block_type_for_label("Form"), BlockType::Table);
        assert_eq!(block_type_for_label("Table-of-contents"), BlockType::Paragraph);
        assert_eq!(block_type_for_label("list_item"), BlockType::ListItem);
        assert_eq!(block_type_for_label("Formula"), BlockType::Formula);
        assert_eq!(block_type_for_label("Sticker"), BlockType::Paragraph);
    }

    #[test]
    fn tolerance_is_relative_to_region() {
        let r = [100.0, 100.0, 200.0, 150.0];
        assert!(contains_with_tolerance(&r, (205.0, 125.0), 0.1));
        assert!(!contains_with_tolerance(&r, (211.0, 125.0), 0.1));
        assert!(contains_with_tolerance(&r, (150.0, 95.0), 0.1));
        assert!(!contains_with_tolerance(&r, (150.0, 94.0), 0.1));
    }

    #[test]
    fn lines_join_top_to_bottom_inside_region() {
        let regions = vec![region("Text", [0.0, 0.0, 500.0, 200.0], 0)];
        let lines = vec![
            line("second", [10.0, 60.0, 400.0, 80.0]),
            line("first", [10.0, 20.0, 400.0, 40.0]),
            line("elsewhere", [10.0, 600.0, 400.0, 620.0]),
            line("   ", [10.0, 100.0, 400.0, 120.0]),
        ];
        let page = assemble_page(1, 800.0, 1000.0, regions, &lines, "[image]");
        assert_eq!(page.blocks.len(), 1);
        assert_eq!(page.blocks[0].text, "first\nsecond");
        assert_eq!(page.height, Some(1000.0));
    }

    #[test]
    fn regions_sorted_by_position_then_top() {
        let regions = vec![
            region("Text", [0.0, 500.0, 100.0, 600.0], 1),
            region("Title", [0.0, 0.0, 100.0, 50.0], 0),
            region("Caption", [0.0, 300.0, 100.0, 320.0], 1),
        ];
        let page = assemble_page(1, 100.0, 1000.0, regions, &[], "[image]");
        let kinds: Vec<BlockType> = page.blocks.iter().map(|b| b.block_type).collect();
        assert_eq!(kinds, vec![BlockType::Title, BlockType::Caption, BlockType::Paragraph]);
        let orders: Vec<u32> = page.blocks.iter().map(|b| b.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn empty_figure_gets_placeholder() {
        let regions = vec![
            region("Figure", [0.0, 0.0, 100.0, 100.0], 0),
            region("Text", [0.0, 500.0, 100.0, 600.0], 1),
        ];
        let page = assemble_page(1, 100.0, 1000.0, regions, &[], "[image]");
        assert_eq!(page.blocks[0].text, "[image]");
        assert_eq!(page.blocks[1].text, "");
    }

    #[test]
    fn no_regions_falls_back_to_lines() {
        let lines = vec![
            line("b", [0.0, 50.0, 10.0, 60.0]),
            line("a", [0.0, 10.0, 10.0, 20.0]),
        ];
        let page = assemble_page(2, 100.0, 100.0, vec![], &lines, "[image]");
        let texts: Vec<&str> = page.blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a"]);
        assert!(page.blocks.iter().all(|b| b.block_type == BlockType::Paragraph));
        assert!(page.blocks.iter().all(|b| b.page_num == 2));
    }

    struct FailingDetector;

    #[async_trait]
    impl LayoutDetector for FailingDetector {
        async fn detect(&self, _page: &PageImage) -> Result<Vec<LayoutRegion>, Pdf2DocxError> {
            Err(Pdf2DocxError::RecognitionFailed {
                backend: "test".into(),
                detail: "model crashed".into(),
            })
        }
    }

    struct FixedLines(Vec<TextLine>);

    #[async_trait]
    impl LineRecognizer for FixedLines {
        async fn recognize(&self, _page: &PageImage) -> Result<Vec<TextLine>, Pdf2DocxError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn layout_failure_degrades_to_lines() {
        let backend = LayoutBackend::new(
            Arc::new(FailingDetector),
            Arc::new(FixedLines(vec![line("hello", [0.0, 0.0, 5.0, 5.0])])),
            &ConversionConfig::default(),
        );
        let pages = vec![PageImage {
            page_num: 1,
            image: image::DynamicImage::new_rgb8(20, 20),
        }];
        let doc = backend.recognize_pages("mem", pages).await.unwrap();
        assert_eq!(doc.pages[0].blocks[0].text, "hello");
        assert_eq!(doc.pages[0].width, Some(20.0));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let backend = LayoutBackend::new(
            Arc::new(FailingDetector),
            Arc::new(FixedLines(vec![])),
            &ConversionConfig::default(),
        );
        let err = backend
            .process(Path::new("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2DocxError::FileNotFound { .. }));
    }
}
