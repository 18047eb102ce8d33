//! Cross-page paragraph merger.
//!
//! When a page ends with a paragraph whose text lacks sentence-terminal
//! punctuation and the next page starts with a paragraph, the two are the
//! halves of one paragraph split by the page break. The upstream text is
//! right-trimmed and the downstream text appended with no separator.
//!
//! Merging repeats until the tail ends a sentence, so further paragraphs of
//! the same downstream page can be absorbed too. Those were already separate
//! blocks on one page, and are joined with a single space.
//!
//! Only paragraph→paragraph pairs merge; captions, list items and headings
//! are never absorbed. A page emptied by a merge stays in the document and is
//! skipped over, so a paragraph can continue across several pages.

use crate::document::{BlockType, StructuredDocument};
use crate::pipeline::order::renumber;
use tracing::debug;

/// Sentence-terminal marks, ASCII and full-width.
pub const SENTENCE_TERMINALS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Whether `text`, trimmed, ends a sentence.
pub fn ends_sentence(text: &str) -> bool {
    text.trim()
        .chars()
        .last()
        .is_some_and(|c| SENTENCE_TERMINALS.contains(&c))
}

/// Heal paragraphs split across page boundaries, then renumber globally.
///
/// Running it on its own output performs no further merges.
pub fn merge_paragraphs(mut doc: StructuredDocument) -> StructuredDocument {
    let mut merges = 0usize;
    // Index of the most recent page that still has blocks.
    let mut prev: Option<usize> = None;

    for i in 0..doc.pages.len() {
        // Absorb leading continuations until the tail ends a sentence or the
        // head is no longer a paragraph.
        let mut absorbed_from_page = false;
        while let Some(p) = prev {
            let (before, after) = doc.pages.split_at_mut(i);
            let (Some(tail), Some(head)) = (before[p].blocks.last_mut(), after[0].blocks.first())
            else {
                break;
            };
            if tail.block_type != BlockType::Paragraph
                || head.block_type != BlockType::Paragraph
                || ends_sentence(&tail.text)
            {
                break;
            }
            let head = after[0].blocks.remove(0);
            let joined_len = tail.text.trim_end().len();
            tail.text.truncate(joined_len);
            if absorbed_from_page && !head.text.starts_with(char::is_whitespace) {
                tail.text.push(' ');
            }
            tail.text.push_str(&head.text);
            absorbed_from_page = true;
            merges += 1;
        }
        if !doc.pages[i].blocks.is_empty() {
            prev = Some(i);
        }
    }

    if merges > 0 {
        debug!("Merged {} paragraphs across page breaks", merges);
    }
    renumber(&mut doc);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Block, Page, UNKNOWN_BBOX};

    fn para(text: &str, page: u32) -> Block {
        Block::new(BlockType::Paragraph, text, UNKNOWN_BBOX, page)
    }

    fn two_pages(a: Block, b: Block) -> StructuredDocument {
        let mut doc = StructuredDocument::new("x");
        doc.pages.push(Page::new(1).with_blocks(vec![a]));
        doc.pages.push(Page::new(2).with_blocks(vec![b]));
        doc
    }

    #[test]
    fn terminal_marks() {
        assert!(ends_sentence("Done."));
        assert!(ends_sentence("完成。 "));
        assert!(ends_sentence("Really？"));
        assert!(!ends_sentence("The cat sat on the"));
        assert!(!ends_sentence(""));
    }

    #[test]
    fn merges_split_sentence() {
        let doc = merge_paragraphs(two_pages(para("The cat sat on the", 1), para(" mat.", 2)));
        assert_eq!(doc.block_count(), 1);
        assert_eq!(doc.pages[0].blocks[0].text, "The cat sat on the mat.");
        assert_eq!(doc.pages[0].blocks[0].order, 1);
        assert!(doc.pages[1].blocks.is_empty());
    }

    #[test]
    fn upstream_is_right_trimmed() {
        let doc = merge_paragraphs(two_pages(para("continues  \n", 1), para("here.", 2)));
        assert_eq!(doc.pages[0].blocks[0].text, "continueshere.");
    }

    #[test]
    fn complete_sentence_not_merged() {
        let doc = merge_paragraphs(two_pages(para("Ends here.", 1), para("New one.", 2)));
        assert_eq!(doc.block_count(), 2);
    }

    #[test]
    fn only_paragraph_pairs_merge() {
        let caption = Block::new(BlockType::Caption, "Figure 1: a", UNKNOWN_BBOX, 1);
        let doc = merge_paragraphs(two_pages(caption, para("text", 2)));
        assert_eq!(doc.block_count(), 2);

        let item = Block::new(BlockType::ListItem, "next item", UNKNOWN_BBOX, 2);
        let doc = merge_paragraphs(two_pages(para("open", 1), item));
        assert_eq!(doc.block_count(), 2);
    }

    #[test]
    fn continuation_spans_emptied_page() {
        let mut doc = StructuredDocument::new("x");
        doc.pages.push(Page::new(1).with_blocks(vec![para("one", 1)]));
        doc.pages.push(Page::new(2).with_blocks(vec![para(" two", 2)]));
        doc.pages.push(Page::new(3).with_blocks(vec![para(" three.", 3)]));

        let doc = merge_paragraphs(doc);
        assert_eq!(doc.block_count(), 1);
        assert_eq!(doc.pages[0].blocks[0].text, "one two three.");
    }

    #[test]
    fn same_page_continuations_keep_a_space() {
        let mut doc = StructuredDocument::new("x");
        doc.pages.push(Page::new(1).with_blocks(vec![para("The cat sat on the", 1)]));
        doc.pages.push(Page::new(2).with_blocks(vec![
            para(" mat and", 2),
            para("Results overview", 2),
            para("ends here.", 2),
        ]));

        let once = merge_paragraphs(doc);
        assert_eq!(
            once.pages[0].blocks[0].text,
            "The cat sat on the mat and Results overview ends here."
        );
        assert!(once.pages[1].blocks.is_empty());
        assert_eq!(merge_paragraphs(once.clone()), once);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let mut doc = StructuredDocument::new("x");
        doc.pages.push(Page::new(1).with_blocks(vec![para("a", 1), para("b", 1)]));
        doc.pages.push(Page::new(2).with_blocks(vec![para("c", 2), para("d", 2)]));
        doc.pages.push(Page::new(3).with_blocks(vec![para("e.", 3)]));

        let once = merge_paragraphs(doc);
        let twice = merge_paragraphs(once.clone());
        assert_eq!(once, twice);
    }
}
