//! Every model prompt used by the library.
//!
//! Recognition prompts ask for JSON so replies can be parsed into typed
//! regions and lines; coordinates are always requested in the pixel space
//! of the attached page image.

/// Layout pass: labelled regions, no text.
pub const LAYOUT_PROMPT: &str = r#"You are a document layout detector. Look at the page image and list every visually distinct region.

Return ONLY a JSON array. Each element:
{"label": "<label>", "bbox": [x1, y1, x2, y2], "position": <reading index starting at 0>}

Coordinates are integer pixels of the attached image, origin top-left.
Use exactly one of these labels:
Title, Section-header, Text, Text-inline-math, List-item, Table, Figure, Picture,
Caption, Footnote, Formula, Page-header, Page-footer, Table-of-contents, Form, Handwriting.

Do not transcribe any text. Do not wrap the JSON in code fences."#;

/// Text-line pass: every line with its box, no semantics.
pub const LINES_PROMPT: &str = r#"You are an OCR engine. Transcribe every line of text on the page image.

Return ONLY a JSON array, one element per visual text line, top to bottom:
{"text": "<exact line text>", "bbox": [x1, y1, x2, y2]}

Coordinates are integer pixels of the attached image, origin top-left.
Copy text exactly as printed, including page numbers and running headers.
Do not merge lines. Do not wrap the JSON in code fences."#;

/// Structure-oriented single pass with table cells.
pub const STRUCTURE_PROMPT: &str = r#"You are a document structure parser specialised in tables and forms.

Return ONLY a JSON array of blocks in reading order:
{"type": "title|text|table|figure|list", "bbox": [x1, y1, x2, y2], "text": "<content>", "rows": [["cell", ...], ...]}

- Coordinates are integer pixels of the attached image, origin top-left.
- "rows" is required for tables (first row is the header) and omitted otherwise.
- Figures carry their caption or an empty string as text.
Do not wrap the JSON in code fences."#;

/// Enhancement: repair flow without changing content.
pub const ENHANCE_PROMPT: &str = r#"You are an editor cleaning up Markdown produced by OCR of a scanned book.

Rules:
1. Repair paragraphs broken by line wraps; join hyphenated words split across lines.
2. Keep every heading, list, table, formula and image reference exactly where it is.
3. Fix obvious OCR character errors only when you are certain.
4. Do not summarise, translate, add or remove content.
5. Output ONLY the Markdown. Do not wrap it in ```markdown fences."#;

/// Appended to [`ENHANCE_PROMPT`] when comprehension questions are wanted.
pub const QUESTIONS_RULE: &str = r###"
6. After each "##" section, insert exactly two comprehension questions about that section,
   formatted as a "**Questions**" paragraph followed by a numbered list."###;

/// Study questions for one chapter, as a JSON array.
pub const QUESTION_PROMPT: &str = r#"You write exam questions for students.

Return ONLY a JSON array. Each element:
{"type": "single_choice" | "true_false",
 "content": "<question>",
 "options": [{"key": "A", "value": "..."}, ...],
 "answer": "<key, or true/false>",
 "explanation": "<one sentence>"}

single_choice questions have exactly four options A-D.
true_false questions have options [{"key":"true","value":"True"},{"key":"false","value":"False"}].
Do not wrap the JSON in code fences."#;

/// System prompt for enhancement, with or without the question rule.
pub fn enhance_system_prompt(insert_questions: bool) -> String {
    if insert_questions {
        format!("{ENHANCE_PROMPT}{QUESTIONS_RULE}")
    } else {
        ENHANCE_PROMPT.to_string()
    }
}

/// User message for question generation.
pub fn question_request(title: &str, content: &str, count: usize) -> String {
    format!("Chapter: {title}\n\nWrite {count} questions about this material:\n\n{content}")
}
