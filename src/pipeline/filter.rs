//! Artifact filter: drop running headers, footers and page numbers.
//!
//! Every rule is a pure predicate over a `(Block, Page)` pair so it can be
//! tested in isolation; the only page-level state consulted is the page's
//! declared height. Rules, in order:
//!
//! 1. the block is typed header, footer or page_number;
//! 2. its trimmed text is short and looks like a page number;
//! 3. it is a short single-line paragraph sitting in the top or bottom
//!    margin band (only when the page height and block position are known).

use crate::config::FilterThresholds;
use crate::document::{Block, BlockType, Page, StructuredDocument};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

// ── Page-number patterns ─────────────────────────────────────────────────────

static RE_ARABIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,5}$").unwrap());

/// Well-formed Roman numerals only, so words such as "did" or "civil" survive.
static RE_ROMAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^m{0,4}(cm|cd|d?c{0,3})(xc|xl|l?x{0,3})(ix|iv|v?i{0,3})$").unwrap()
});

/// "- 12 -", "  7 ", "--3--".
static RE_DASHED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-\s]*\d{1,4}[-\s]*$").unwrap());

/// True when `text` (already trimmed) matches the page-number pattern family.
pub fn looks_like_page_number(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    RE_ARABIC.is_match(text) || RE_ROMAN.is_match(text) || RE_DASHED.is_match(text)
}

// ── Predicates ───────────────────────────────────────────────────────────────

/// Rule 1: declared page furniture.
pub fn is_declared_furniture(block: &Block) -> bool {
    block.block_type.is_page_furniture()
}

/// Rule 2: short text shaped like a page number, whatever its declared type.
pub fn is_page_number_text(block: &Block, thresholds: &FilterThresholds) -> bool {
    let text = block.text.trim();
    text.chars().count() < thresholds.page_number_max_len && looks_like_page_number(text)
}

/// Whether the block starts in the top band or ends in the bottom band.
///
/// Always false when the page height is unknown or the block carries the
/// unknown-position sentinel.
pub fn in_margin_zone(block: &Block, page: &Page, thresholds: &FilterThresholds) -> bool {
    let Some(height) = page.known_height() else {
        return false;
    };
    if block.has_unknown_position() {
        return false;
    }
    let [_, y1, _, y2] = block.bbox;
    let band = height * thresholds.margin_ratio;
    y1 < band || y2 > height - band
}

/// Rule 3: a short margin paragraph.
pub fn is_margin_boilerplate(block: &Block, page: &Page, thresholds: &FilterThresholds) -> bool {
    if block.block_type != BlockType::Paragraph {
        return false;
    }
    let text = block.text.trim();
    if text.chars().count() >= thresholds.margin_text_max_len {
        return false;
    }
    let single_line = !text.contains('\n');
    (single_line || looks_like_page_number(text)) && in_margin_zone(block, page, thresholds)
}

/// Whether any removal rule matches.
pub fn is_artifact(block: &Block, page: &Page, thresholds: &FilterThresholds) -> bool {
    is_declared_furniture(block)
        || is_page_number_text(block, thresholds)
        || is_margin_boilerplate(block, page, thresholds)
}

// ── Document pass ────────────────────────────────────────────────────────────

/// Drop artifacts and renumber each page's blocks 1..k in their current order.
pub fn filter_artifacts(doc: StructuredDocument, thresholds: &FilterThresholds) -> StructuredDocument {
    let mut removed = 0usize;
    let pages = doc
        .pages
        .into_iter()
        .map(|mut page| {
            let blocks = std::mem::take(&mut page.blocks);
            let before = blocks.len();
            let mut kept: Vec<Block> = blocks
                .into_iter()
                .filter(|b| !is_artifact(b, &page, thresholds))
                .collect();
            removed += before - kept.len();
            for (i, block) in kept.iter_mut().enumerate() {
                block.order = (i + 1) as u32;
            }
            page.blocks = kept;
            page
        })
        .collect();

    debug!("Artifact filter removed {} blocks", removed);
    StructuredDocument {
        source: doc.source,
        pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::UNKNOWN_BBOX;

    fn t() -> FilterThresholds {
        FilterThresholds::default()
    }

    fn page() -> Page {
        Page::new(1).with_size(1000.0, 1000.0)
    }

    fn para(text: &str, y1: f64, y2: f64) -> Block {
        Block::new(BlockType::Paragraph, text, [50.0, y1, 900.0, y2], 1)
    }

    #[test]
    fn page_number_patterns() {
        // "mix" is m + ix, a well-formed numeral.
        for s in ["1", "12345", "iv", "XII", "- 12 -", "--3--", "mix"] {
            assert!(looks_like_page_number(s), "{s}");
        }
        for s in ["", "123456", "did", "civil", "vim", "Page", "1.2", "a1"] {
            assert!(!looks_like_page_number(s), "{s}");
        }
    }

    #[test]
    fn declared_furniture_is_removed_anywhere() {
        let b = Block::new(BlockType::Footer, "Annual report 2024, confidential", [0.0, 500.0, 10.0, 510.0], 1);
        assert!(is_artifact(&b, &page(), &t()));
    }

    #[test]
    fn page_number_text_removed_regardless_of_type() {
        let b = Block::new(BlockType::Title, " 42 ", [0.0, 500.0, 10.0, 510.0], 1);
        assert!(is_page_number_text(&b, &t()));
    }

    #[test]
    fn page_number_length_threshold_is_strict() {
        let thresholds = FilterThresholds {
            page_number_max_len: 3,
            ..t()
        };
        let b = Block::new(BlockType::Paragraph, "123", UNKNOWN_BBOX, 1);
        assert!(!is_page_number_text(&b, &thresholds));
        let b = Block::new(BlockType::Paragraph, "12", UNKNOWN_BBOX, 1);
        assert!(is_page_number_text(&b, &thresholds));
    }

    #[test]
    fn short_margin_paragraph_removed() {
        assert!(is_margin_boilerplate(&para("Journal of Things", 20.0, 40.0), &page(), &t()));
        assert!(is_margin_boilerplate(&para("Draft copy", 950.0, 970.0), &page(), &t()));
    }

    #[test]
    fn body_paragraph_kept() {
        assert!(!is_artifact(&para("Short line", 400.0, 420.0), &page(), &t()));
    }

    #[test]
    fn multiline_margin_paragraph_kept() {
        assert!(!is_margin_boilerplate(&para("first\nsecond", 20.0, 60.0), &page(), &t()));
    }

    #[test]
    fn long_margin_paragraph_kept() {
        let text = "a".repeat(50);
        assert!(!is_margin_boilerplate(&para(&text, 20.0, 40.0), &page(), &t()));
    }

    #[test]
    fn margin_rule_needs_known_height_and_position() {
        let b = para("Running head", 20.0, 40.0);
        assert!(!is_margin_boilerplate(&b, &Page::new(1), &t()));

        let sentinel = Block::new(BlockType::Paragraph, "Running head", UNKNOWN_BBOX, 1);
        assert!(!is_margin_boilerplate(&sentinel, &page(), &t()));
    }

    #[test]
    fn margin_rule_only_for_paragraphs() {
        let b = Block::new(BlockType::Section, "Introduction", [50.0, 20.0, 900.0, 40.0], 1);
        assert!(!is_artifact(&b, &page(), &t()));
    }

    #[test]
    fn filter_renumbers_per_page() {
        let mut doc = StructuredDocument::new("x");
        doc.pages.push(page().with_blocks(vec![
            Block::new(BlockType::Header, "Head", [0.0, 0.0, 10.0, 10.0], 1).with_order(1),
            para("Body text that stays.", 300.0, 320.0).with_order(2),
            Block::new(BlockType::Paragraph, "3", [0.0, 980.0, 10.0, 990.0], 1).with_order(3),
            para("More body.", 400.0, 420.0).with_order(4),
        ]));

        let out = filter_artifacts(doc, &t());
        let orders: Vec<u32> = out.pages[0].blocks.iter().map(|b| b.order).collect();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(out.pages[0].blocks[0].text, "Body text that stays.");
    }
}
