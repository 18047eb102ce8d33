//! # edgequake-pdf2docx
//!
//! Recover the structure of scanned PDFs and turn them into Markdown, Word
//! documents and study notebooks.
//!
//! ## Why this crate?
//!
//! A scanned page has no usable text layer: headings, paragraphs, tables and
//! running headers are all just pixels. This crate rasterises each page,
//! asks a recognition backend for typed, positioned blocks, then cleans the
//! result up with deterministic passes: page furniture is dropped, blocks
//! are put in reading order, and paragraphs broken across pages are joined
//! again. The cleaned model exports to Markdown, which a language model can
//! optionally polish before pandoc renders the DOCX.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Recognize  layout + line models, structure model, or text layer
//!  ├─ 3. Refine     filter artifacts → reading order → cross-page merge
//!  ├─ 4. Export     deterministic Markdown
//!  ├─ 5. Enhance    optional LLM pass (falls back to the raw Markdown)
//!  └─ 6. Render     pandoc → DOCX
//! ```
//!
//! Long-running conversions go through [`ConversionService`], which tracks
//! each upload as a task (`pending → processing → done | failed`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2docx::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ConversionConfig::default();
//!     let output = convert("scan.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     for (stage, reason) in &output.degraded {
//!         eprintln!("{stage} fell back: {reason}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2docx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External tools
//!
//! | Tool | Needed for |
//! |------|------------|
//! | pdfium | every path (rendering and text layer) |
//! | pandoc | DOCX output |
//! | tesseract | direct conversion with OCR |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod direct;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod recognize;
pub mod service;
pub mod study;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BackendKind, ConversionConfig, ConversionConfigBuilder, ConvertOptions, FilterThresholds};
pub use convert::{
    convert, convert_from_bytes, convert_sync, convert_to_file, convert_to_file_with, inspect,
    structure, to_markdown, ConversionOutput, OutputFormat,
};
pub use direct::{convert_direct, direct_markdown};
pub use document::{BBox, Block, BlockType, Page, StructuredDocument};
pub use error::{CallError, Pdf2DocxError};
pub use pipeline::docx::{DocumentRenderer, PandocRenderer};
pub use pipeline::render::DocumentInfo;
pub use progress::{Stage, TaskObserver};
pub use recognize::RecognitionBackend;
pub use service::{ConversionService, StatusReport, TaskArtifact};
pub use task::TaskStatus;
