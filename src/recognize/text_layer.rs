//! Backends that read the PDF's own text layer instead of pixels.
//!
//! [`TextLayerBackend`] has no layout labels: it groups positioned text runs
//! into lines and lines into blocks by vertical proximity, then types a block
//! by shape alone (a short single line is a section, everything else a
//! paragraph). [`PlainTextBackend`] is the text-only extraction path: one
//! paragraph per blank-line-separated chunk, no positions.

use crate::document::{BBox, Block, BlockType, Page, StructuredDocument, UNKNOWN_BBOX};
use crate::error::Pdf2DocxError;
use crate::pipeline::render::{self, PageText, TextSegment};
use crate::recognize::{ensure_exists, RecognitionBackend};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::info;

/// Single-line blocks shorter than this (in characters) are typed as sections.
const SECTION_MAX_CHARS: usize = 100;

/// Lines closer than this fraction of the previous line's height share a block.
const BLOCK_GAP_RATIO: f64 = 0.8;

struct Line<'a> {
    bbox: BBox,
    runs: Vec<&'a TextSegment>,
}

impl Line<'_> {
    /// Runs left to right, joined by single spaces.
    fn text(&mut self) -> String {
        self.runs.sort_by(|a, b| a.bbox[0].total_cmp(&b.bbox[0]));
        let mut out = String::new();
        for run in &self.runs {
            let run = run.text.trim();
            if run.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(run);
        }
        out
    }
}

fn union(a: &BBox, b: &BBox) -> BBox {
    [a[0].min(b[0]), a[1].min(b[1]), a[2].max(b[2]), a[3].max(b[3])]
}

/// Group text runs into lines (by vertical overlap) and lines into blocks.
pub fn group_segments(segments: &[TextSegment]) -> Vec<(BBox, String)> {
    let mut sorted: Vec<&TextSegment> = segments.iter().collect();
    sorted.sort_by(|a, b| {
        a.bbox[1]
            .total_cmp(&b.bbox[1])
            .then_with(|| a.bbox[0].total_cmp(&b.bbox[0]))
    });

    let mut lines: Vec<Line<'_>> = Vec::new();
    for seg in sorted {
        let mid = (seg.bbox[1] + seg.bbox[3]) / 2.0;
        match lines.last_mut() {
            Some(line) if line.bbox[1] <= mid && mid <= line.bbox[3] => {
                line.bbox = union(&line.bbox, &seg.bbox);
                line.runs.push(seg);
            }
            _ => lines.push(Line {
                bbox: seg.bbox,
                runs: vec![seg],
            }),
        }
    }

    let mut blocks: Vec<(BBox, String, f64)> = Vec::new();
    for mut line in lines {
        let line_text = line.text();
        if line_text.is_empty() {
            continue;
        }
        let height = (line.bbox[3] - line.bbox[1]).max(0.0);
        match blocks.last_mut() {
            Some((bbox, text, prev_height))
                if line.bbox[1] - bbox[3] <= *prev_height * BLOCK_GAP_RATIO =>
            {
                *bbox = union(bbox, &line.bbox);
                text.push('\n');
                text.push_str(&line_text);
                *prev_height = height;
            }
            _ => blocks.push((line.bbox, line_text, height)),
        }
    }

    blocks.into_iter().map(|(b, t, _)| (b, t)).collect()
}

/// Type a block from its shape.
pub fn block_type_for_shape(text: &str) -> BlockType {
    let text = text.trim();
    if text.chars().count() < SECTION_MAX_CHARS && !text.contains('\n') {
        BlockType::Section
    } else {
        BlockType::Paragraph
    }
}

fn page_from_segments(page: &PageText) -> Page {
    let blocks = group_segments(&page.segments)
        .into_iter()
        .enumerate()
        .map(|(i, (bbox, text))| {
            Block::new(block_type_for_shape(&text), text, bbox, page.page_num)
                .with_order(i as u32 + 1)
        })
        .collect();
    Page::new(page.page_num)
        .with_size(page.width, page.height)
        .with_blocks(blocks)
}

/// General-purpose backend without layout labels.
pub struct TextLayerBackend {
    dpi: u32,
    password: Option<String>,
}

impl TextLayerBackend {
    pub fn new(dpi: u32, password: Option<String>) -> Self {
        Self { dpi, password }
    }
}

#[async_trait]
impl RecognitionBackend for TextLayerBackend {
    fn name(&self) -> &str {
        "text-layer"
    }

    fn check_available(&self) -> Result<(), Pdf2DocxError> {
        render::bind_pdfium().map(|_| ())
    }

    async fn process(&self, pdf: &Path) -> Result<StructuredDocument, Pdf2DocxError> {
        ensure_exists(pdf)?;
        let pages = render::extract_text(pdf, self.dpi, self.password.as_deref()).await?;
        info!("Text-layer backend: {} pages", pages.len());
        let mut doc = StructuredDocument::new(pdf.display().to_string());
        doc.pages = pages.iter().map(page_from_segments).collect();
        Ok(doc)
    }
}

// ── Plain text ───────────────────────────────────────────────────────────────

static RE_BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// One paragraph per blank-line-separated chunk of `text`.
pub fn paragraphs_from_text(page_num: u32, text: &str) -> Vec<Block> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    RE_BLANK_LINE
        .split(&text)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .enumerate()
        .map(|(i, chunk)| {
            Block::new(BlockType::Paragraph, chunk, UNKNOWN_BBOX, page_num).with_order(i as u32 + 1)
        })
        .collect()
}

/// Text-only extraction: the fallback when structured recognition fails.
pub struct PlainTextBackend {
    password: Option<String>,
}

impl PlainTextBackend {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

#[async_trait]
impl RecognitionBackend for PlainTextBackend {
    fn name(&self) -> &str {
        "plain-text"
    }

    fn check_available(&self) -> Result<(), Pdf2DocxError> {
        render::bind_pdfium().map(|_| ())
    }

    async fn process(&self, pdf: &Path) -> Result<StructuredDocument, Pdf2DocxError> {
        ensure_exists(pdf)?;
        // 72 dpi keeps page sizes in PDF points; positions are not used.
        let pages = render::extract_text(pdf, 72, self.password.as_deref()).await?;
        let mut doc = StructuredDocument::new(pdf.display().to_string());
        doc.pages = pages
            .iter()
            .map(|p| {
                Page::new(p.page_num)
                    .with_size(p.width, p.height)
                    .with_blocks(paragraphs_from_text(p.page_num, &p.text))
            })
            .collect();
        Ok(doc)
    }
}
