//! Markdown exporter: a pure, deterministic `StructuredDocument -> String`.
//!
//! Each block renders to its Markdown form followed by a blank line; the
//! concatenation is trimmed and terminated by exactly one newline.
//!
//! | type | rendering |
//! |------|-----------|
//! | title | `# text` |
//! | section | `## text` above 20 characters, `### text` otherwise |
//! | paragraph, list_item | raw text |
//! | table | GFM pipe table from rows, else a fenced block of the raw text |
//! | figure, caption | `![text]`, `![image]` when empty |
//! | footnote | block quote |
//! | formula | `$$` display block |
//! | anything else | raw text |

use crate::document::{Block, BlockType, StructuredDocument};

/// Sections longer than this (in characters) render one level higher.
const SECTION_LEVEL_THRESHOLD: usize = 20;

/// Render the whole document.
pub fn export(doc: &StructuredDocument) -> String {
    let body: String = doc.blocks().map(render_block).collect();
    let trimmed = body.trim();
    let mut out = String::with_capacity(trimmed.len() + 1);
    out.push_str(trimmed);
    out.push('\n');
    out
}

/// Render one block, including its trailing blank line.
///
/// Returns an empty string for blocks with nothing to show (empty text and,
/// for tables, no rows).
pub fn render_block(block: &Block) -> String {
    let text = block.text.trim();

    match block.block_type {
        BlockType::Table => match block.rows() {
            Some(rows) => format!("{}\n\n", render_table(rows)),
            None if text.is_empty() => String::new(),
            None => format!("```\n{text}\n```\n\n"),
        },
        BlockType::Figure | BlockType::Caption => {
            let alt = if text.is_empty() { "image" } else { text };
            format!("![{alt}]\n\n")
        }
        _ if text.is_empty() => String::new(),
        BlockType::Title => format!("# {text}\n\n"),
        BlockType::Section => {
            let level = if text.chars().count() > SECTION_LEVEL_THRESHOLD {
                "##"
            } else {
                "###"
            };
            format!("{level} {text}\n\n")
        }
        BlockType::Footnote => {
            let quoted: Vec<String> = text.lines().map(|l| format!("> {l}")).collect();
            format!("{}\n\n", quoted.join("\n"))
        }
        BlockType::Formula => format!("$$\n{text}\n$$\n\n"),
        BlockType::Paragraph
        | BlockType::ListItem
        | BlockType::Header
        | BlockType::Footer
        | BlockType::PageNumber => format!("{text}\n\n"),
    }
}

/// GFM pipe table; the first row is the header, short rows are padded.
fn render_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<String> = (0..width)
            .map(|c| row.get(c).map(|s| escape_cell(s)).unwrap_or_default())
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
        if i == 0 {
            lines.push(format!("| {} |", vec!["---"; width].join(" | ")));
        }
    }
    lines.join("\n")
}

fn escape_cell(cell: &str) -> String {
    cell.trim()
        .replace('|', "\\|")
        .replace("\r\n", " ")
        .replace('\n', " ")
}
