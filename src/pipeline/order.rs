//! Reading-order normalizer.
//!
//! Pages are sorted by `page_num`; blocks within a page by their provisional
//! `order`, with the top edge (`bbox.y1`) breaking ties. The whole document
//! then gets one dense global order `1..N`. Both sorts are stable, so blocks
//! that tie on both keys keep their incoming sequence.

use crate::document::StructuredDocument;

/// Sort pages and blocks, then assign global order `1..N`.
pub fn normalize(mut doc: StructuredDocument) -> StructuredDocument {
    doc.pages.sort_by_key(|p| p.page_num);
    for page in &mut doc.pages {
        page.blocks.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.bbox[1].total_cmp(&b.bbox[1]))
        });
    }
    renumber(&mut doc);
    doc
}

/// Reassign a dense global order in current page/block sequence.
pub fn renumber(doc: &mut StructuredDocument) {
    let mut next = 1u32;
    for page in &mut doc.pages {
        for block in &mut page.blocks {
            block.order = next;
            next += 1;
        }
    }
}

/// True when the global order is exactly `1..N` in traversal order.
pub fn is_dense(doc: &StructuredDocument) -> bool {
    doc.blocks()
        .enumerate()
        .all(|(i, b)| b.order as usize == i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Block, BlockType, Page};

    fn block(text: &str, order: u32, y1: f64, page: u32) -> Block {
        Block::new(BlockType::Paragraph, text, [0.0, y1, 10.0, y1 + 5.0], page).with_order(order)
    }

    #[test]
    fn sorts_pages_and_blocks() {
        let mut doc = StructuredDocument::new("x");
        doc.pages.push(Page::new(2).with_blocks(vec![block("d", 1, 0.0, 2)]));
        doc.pages.push(Page::new(1).with_blocks(vec![
            block("c", 3, 0.0, 1),
            block("b", 1, 200.0, 1),
            block("a", 1, 100.0, 1),
        ]));

        let doc = normalize(doc);
        let texts: Vec<&str> = doc.blocks().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c", "d"]);
        let orders: Vec<u32> = doc.blocks().map(|b| b.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);
        assert!(is_dense(&doc));
    }

    #[test]
    fn empty_document_is_dense() {
        let doc = normalize(StructuredDocument::new("x"));
        assert!(is_dense(&doc));
    }

    #[test]
    fn gaps_and_duplicates_are_compacted() {
        let mut doc = StructuredDocument::new("x");
        doc.pages.push(Page::new(1).with_blocks(vec![
            block("a", 7, 0.0, 1),
            block("b", 7, 0.0, 1),
            block("c", 90, 0.0, 1),
        ]));
        assert!(!is_dense(&doc));
        let doc = normalize(doc);
        assert!(is_dense(&doc));
        assert_eq!(doc.pages[0].blocks[1].text, "b");
    }
}
