//! Study artifacts: chapters, generated questions and a Jupyter notebook.
//!
//! Markdown is split into chapters on `#`–`###` headings. Chapters with
//! enough content get model-written questions (single choice or true/false),
//! which are normalised and validated before use. The notebook (nbformat 4)
//! carries the chapter text, the questions, an `answers` cell for the student
//! and a cell that grades those answers locally.

use crate::pipeline::llm::{chat_with_retry, ChatClient, ChatRequest, RetryPolicy};
use crate::prompts::{question_request, QUESTION_PROMPT};
use crate::recognize::vision::parse_json_array;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Chapter content beyond this many characters is cut off.
pub const MAX_CHAPTER_CHARS: usize = 12_000;

/// Chapters at or below this many characters get no questions.
pub const MIN_QUESTION_CHARS: usize = 100;

/// Appended to truncated chapter content.
pub const TRUNCATION_MARKER: &str = "\n\n[content truncated]";

static RE_CHAPTER_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,3})\s+(.+?)\s*#*\s*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    TrueFalse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub content: String,
    pub options: Vec<QuestionOption>,
    pub answer: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chapter {
    /// Heading depth, 1–3; 0 for the untitled preamble.
    pub level: u8,
    pub title: String,
    pub content: String,
    pub questions: Vec<Question>,
}

// ── Chapters ─────────────────────────────────────────────────────────────────

fn cap(content: &str) -> String {
    let content = content.trim();
    match content.char_indices().nth(MAX_CHAPTER_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &content[..cut]),
        None => content.to_string(),
    }
}

fn flush(level: u8, title: String, body: &mut String, chapters: &mut Vec<Chapter>) {
    if level > 0 || !body.trim().is_empty() {
        chapters.push(Chapter {
            level,
            title,
            content: cap(body),
            questions: Vec::new(),
        });
    }
    body.clear();
}

/// Split Markdown into chapters on level 1–3 headings.
///
/// Text before the first heading becomes a level-0 chapter titled
/// `fallback_title`; a document without headings is a single such chapter.
/// Headings inside fenced code are ignored.
pub fn extract_chapters(markdown: &str, fallback_title: &str) -> Vec<Chapter> {
    let mut chapters = Vec::new();
    let mut current: (u8, String) = (0, fallback_title.to_string());
    let mut body = String::new();
    let mut in_fence = false;

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let heading = if in_fence {
            None
        } else {
            RE_CHAPTER_HEADING.captures(line)
        };
        match heading {
            Some(caps) => {
                let (level, title) = std::mem::replace(
                    &mut current,
                    (caps[1].len() as u8, caps[2].trim().to_string()),
                );
                flush(level, title, &mut body, &mut chapters);
            }
            None => {
                body.push_str(line);
                body.push('\n');
            }
        }
    }
    let (level, title) = current;
    flush(level, title, &mut body, &mut chapters);

    debug!("Split Markdown into {} chapters", chapters.len());
    chapters
}

// ── Questions ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    options: Option<Vec<QuestionOption>>,
    #[serde(default)]
    answer: Option<Value>,
    #[serde(default)]
    explanation: Option<String>,
}

fn true_false_options() -> Vec<QuestionOption> {
    vec![
        QuestionOption {
            key: "true".into(),
            value: "True".into(),
        },
        QuestionOption {
            key: "false".into(),
            value: "False".into(),
        },
    ]
}

/// Normalise one model-written question; `None` when it is unusable.
///
/// Unknown types become single choice. True/false questions get the
/// standard options when none are given. The answer must name an option.
fn normalise_question(raw: RawQuestion) -> Option<Question> {
    let kind = match raw.kind.as_deref().map(|k| k.trim().to_ascii_lowercase()) {
        Some(k) if k == "true_false" => QuestionKind::TrueFalse,
        _ => QuestionKind::SingleChoice,
    };
    let content = raw.content.unwrap_or_default().trim().to_string();
    if content.is_empty() {
        return None;
    }

    let options = match raw.options.filter(|o| !o.is_empty()) {
        Some(o) => o,
        None if kind == QuestionKind::TrueFalse => true_false_options(),
        None => return None,
    };

    let answer = match raw.answer? {
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    let key = options
        .iter()
        .find(|o| o.key.eq_ignore_ascii_case(&answer))?
        .key
        .clone();

    Some(Question {
        kind,
        content,
        options,
        answer: key,
        explanation: raw.explanation.unwrap_or_default().trim().to_string(),
    })
}

/// Parse a question-generation reply.
pub fn parse_questions(reply: &str) -> Vec<Question> {
    parse_json_array::<RawQuestion>(reply)
        .unwrap_or_default()
        .into_iter()
        .filter_map(normalise_question)
        .collect()
}

/// Ask `client` for `count` questions per chapter with enough content.
///
/// Failures leave that chapter without questions.
pub async fn generate_questions(
    client: &dyn ChatClient,
    chapters: &mut [Chapter],
    count: usize,
    policy: RetryPolicy,
    max_tokens: usize,
) {
    for chapter in chapters.iter_mut() {
        if chapter.content.chars().count() <= MIN_QUESTION_CHARS {
            continue;
        }
        let request = ChatRequest {
            system: QUESTION_PROMPT.to_string(),
            user: question_request(&chapter.title, &chapter.content, count),
            images: Vec::new(),
            temperature: 0.3,
            max_tokens,
        };
        match chat_with_retry(client, &request, policy).await {
            Ok(reply) => {
                chapter.questions = parse_questions(&reply);
                info!("Chapter '{}': {} questions", chapter.title, chapter.questions.len());
            }
            Err(e) => warn!("Chapter '{}': question generation failed — {}", chapter.title, e),
        }
    }
}

// ── Notebook ─────────────────────────────────────────────────────────────────

const GRADING_CELL: &str = r#"import json
ANSWER_KEY = json.loads({answer_key})
correct = 0
for number, expected in ANSWER_KEY.items():
    given = str(answers.get(int(number), "")).strip().lower()
    ok = given == expected["answer"].lower()
    correct += ok
    verdict = "correct" if ok else "wrong"
    print(f"Q{number}: {verdict} (answer: {expected['answer']}) {expected['explanation']}")
print(f"Score: {correct} / {len(ANSWER_KEY)}")
"#;

/// nbformat keeps cell sources as lines with their newlines.
fn source(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

fn markdown_cell(text: &str) -> Value {
    json!({"cell_type": "markdown", "metadata": {}, "source": source(text)})
}

fn code_cell(text: &str) -> Value {
    json!({
        "cell_type": "code",
        "metadata": {},
        "execution_count": null,
        "outputs": [],
        "source": source(text),
    })
}

fn question_markdown(number: usize, q: &Question) -> String {
    let mut s = format!("**Q{number}.** {}\n\n", q.content);
    for o in &q.options {
        s.push_str(&format!("- `{}`: {}\n", o.key, o.value));
    }
    s
}

/// Build an nbformat-4 notebook for `chapters`.
pub fn build_notebook(title: &str, chapters: &[Chapter]) -> Value {
    let mut cells = vec![markdown_cell(&format!("# {title}\n"))];
    let mut key: Vec<(usize, &Question)> = Vec::new();

    for chapter in chapters {
        let hashes = "#".repeat(usize::from(chapter.level.clamp(1, 3)) + 1);
        cells.push(markdown_cell(&format!(
            "{hashes} {}\n\n{}\n",
            chapter.title, chapter.content
        )));
        if chapter.questions.is_empty() {
            continue;
        }
        let mut block = String::from("### Questions\n\n");
        for q in &chapter.questions {
            let number = key.len() + 1;
            block.push_str(&question_markdown(number, q));
            block.push('\n');
            key.push((number, q));
        }
        cells.push(markdown_cell(block.trim_end()));
    }

    if !key.is_empty() {
        let mut answers = String::from("# Fill in the key of your answer for each question.\nanswers = {\n");
        for (number, _) in &key {
            answers.push_str(&format!("    {number}: \"\",\n"));
        }
        answers.push_str("}\n");
        cells.push(code_cell(&answers));

        let answer_key: serde_json::Map<String, Value> = key
            .iter()
            .map(|(n, q)| {
                (
                    n.to_string(),
                    json!({"answer": q.answer, "explanation": q.explanation}),
                )
            })
            .collect();
        let grading = GRADING_CELL.replace(
            "{answer_key}",
            &Value::String(Value::Object(answer_key).to_string()).to_string(),
        );
        cells.push(code_cell(&grading));
    }

    json!({
        "nbformat": 4,
        "nbformat_minor": 5,
        "metadata": {
            "kernelspec": {"display_name": "Python 3", "language": "python", "name": "python3"},
            "language_info": {"name": "python"},
        },
        "cells": cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use async_trait::async_trait;

    #[test]
    fn chapters_split_on_headings() {
        let md = "Preface text.\n\n# One\n\nAlpha.\n\n## Two\nBeta.\n\n#### Deep\nstill two\n";
        let ch = extract_chapters(md, "Notes");
        let titles: Vec<&str> = ch.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Notes", "One", "Two"]);
        assert_eq!(ch[0].level, 0);
        assert_eq!(ch[2].level, 2);
        assert!(ch[2].content.contains("#### Deep"));
    }

    #[test]
    fn no_headings_is_one_chapter() {
        let ch = extract_chapters("just text\n", "Doc");
        assert_eq!(ch.len(), 1);
        assert_eq!(ch[0].title, "Doc");
        assert_eq!(ch[0].content, "just text");
    }

    #[test]
    fn fenced_hash_is_not_a_heading() {
        let ch = extract_chapters("# Real\n```\n# comment\n```\n", "Doc");
        assert_eq!(ch.len(), 1);
    }

    #[test]
    fn long_chapter_is_capped() {
        let md = format!("# Big\n{}", "x".repeat(MAX_CHAPTER_CHARS + 10));
        let ch = extract_chapters(&md, "Doc");
        assert!(ch[0].content.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            ch[0].content.chars().count(),
            MAX_CHAPTER_CHARS + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn questions_normalised_and_validated() {
        let reply = r#"```json
        [
          {"type": "Single_Choice", "content": " Which? ", "options": [{"key": "A", "value": "a"}, {"key": "B", "value": "b"}], "answer": "b"},
          {"type": "true_false", "content": "Sky is blue", "answer": true, "explanation": "Rayleigh"},
          {"type": "essay", "content": "Bad answer", "options": [{"key": "A", "value": "a"}], "answer": "Z"},
          {"type": "single_choice", "content": "", "options": [{"key": "A", "value": "a"}], "answer": "A"},
          {"type": "single_choice", "content": "No options", "answer": "A"}
        ]
        ```"#;
        let qs = parse_questions(reply);
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].content, "Which?");
        assert_eq!(qs[0].answer, "B");
        assert_eq!(qs[1].kind, QuestionKind::TrueFalse);
        assert_eq!(qs[1].options.len(), 2);
        assert_eq!(qs[1].answer, "true");
    }

    #[test]
    fn notebook_shape() {
        let mut ch = extract_chapters("# Intro\nSome text.\n", "Doc");
        ch[0].questions.push(Question {
            kind: QuestionKind::TrueFalse,
            content: "Is it?".into(),
            options: true_false_options(),
            answer: "true".into(),
            explanation: String::new(),
        });
        let nb = build_notebook("Book", &ch);
        assert_eq!(nb["nbformat"], 4);
        let cells = nb["cells"].as_array().unwrap();
        // title, chapter, questions, answers, grading
        assert_eq!(cells.len(), 5);
        assert_eq!(cells[3]["cell_type"], "code");
        let grading: String = cells[4]["source"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l.as_str().unwrap())
            .collect();
        assert!(grading.contains("ANSWER_KEY"));
        assert!(grading.contains("Score:"));
    }

    #[test]
    fn notebook_without_questions_has_no_code() {
        let ch = extract_chapters("# A\ntext\n", "Doc");
        let nb = build_notebook("Book", &ch);
        let cells = nb["cells"].as_array().unwrap();
        assert!(cells.iter().all(|c| c["cell_type"] == "markdown"));
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl ChatClient for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<String, CallError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn short_chapters_get_no_questions() {
        let md = format!("# Short\ntiny\n\n# Long\n{}\n", "word ".repeat(40));
        let mut ch = extract_chapters(&md, "Doc");
        let client = Fixed(r#"[{"type": "true_false", "content": "Q", "answer": "false"}]"#);
        let policy = RetryPolicy {
            max_retries: 0,
            delay: std::time::Duration::from_millis(1),
            call_timeout: std::time::Duration::from_secs(5),
        };
        generate_questions(&client, &mut ch, 2, policy, 1024).await;
        assert!(ch[0].questions.is_empty());
        assert_eq!(ch[1].questions.len(), 1);
    }
}
