//! Cleanup of model-enhanced Markdown before it is rendered.
//!
//! The enhancement reply should be plain Markdown, but models wrap it in
//! fences, emit CRLF, leave zero-width characters behind or glue headings
//! to the preceding paragraph (which pandoc then reads as paragraph text).
//! Each rule below is a pure `&str -> String` pass; [`clean_enhanced`] runs
//! them in order.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to an enhancement reply.
///
/// Order: fences, line endings, trailing whitespace, heading spacing,
/// blank-line runs, invisible characters, final newline.
pub fn clean_enhanced(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = separate_headings(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Fences ───────────────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[ \t]*(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*$").unwrap());

/// Remove one pair of fences wrapping the whole reply.
pub fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Whitespace ───────────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

/// Trailing whitespace goes, except a two-space hard break that is followed
/// by another line of the same paragraph.
fn trim_trailing_whitespace(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_end();
        let continues = lines.get(i + 1).is_some_and(|next| !next.trim().is_empty());
        if line.ends_with("  ") && !trimmed.is_empty() && continues {
            out.push(format!("{trimmed}  "));
        } else {
            out.push(trimmed.to_string());
        }
    }
    out.join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// At most one blank line between blocks.
fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{trimmed}\n")
    }
}

// ── Headings ─────────────────────────────────────────────────────────────────

static RE_ATX_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+\S").unwrap());

/// Ensure a blank line before every ATX heading outside code fences.
fn separate_headings(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_fence = false;
    for line in input.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let needs_gap = !in_fence
            && RE_ATX_HEADING.is_match(line)
            && out.last().is_some_and(|prev| !prev.is_empty());
        if needs_gap {
            out.push("");
        }
        out.push(line);
    }
    out.join("\n")
}

// ── Invisible characters ─────────────────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'],
        "",
    )
}
