//! Pipeline stages for scanned-PDF conversion.
//!
//! The model-independent passes (`filter`, `order`, `merge`, `markdown`) are
//! pure functions over the document model. The three task stages (`extract`,
//! `enhance`, `docx`) wrap them with their fallback policy.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ recognize ──▶ filter ──▶ order ──▶ merge ──▶ markdown
//! (path/URL) (pdfium)  (backends)    (artifacts) (y, x)   (pages)   (export)
//!                                                                       │
//!                       docx ◀── postprocess ◀── enhance (llm) ◀────────┘
//!                     (pandoc)
//! ```
//!
//! 1. [`input`]: canonicalise a path or URL; validate uploads
//! 2. [`render`]: rasterise pages and read the text layer; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]: PNG-encode and base64-wrap page images for model requests
//! 4. [`filter`], [`order`], [`merge`]: artifact removal, reading order,
//!    cross-page paragraph joins
//! 5. [`markdown`]: deterministic export of the document model
//! 6. [`llm`]: model calls with retry/backoff
//! 7. [`postprocess`]: cleanup of enhanced Markdown
//! 8. [`extract`], [`enhance`], [`docx`]: the task stages; [`stage`] holds
//!    their shared outcome type

pub mod docx;
pub mod encode;
pub mod enhance;
pub mod extract;
pub mod filter;
pub mod input;
pub mod llm;
pub mod markdown;
pub mod merge;
pub mod order;
pub mod postprocess;
pub mod render;
pub mod stage;
