//! Error types for the edgequake-pdf2docx library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2DocxError`]: **fatal**, the operation cannot proceed at all
//!   (missing file, corrupt PDF, renderer crashed). Returned as
//!   `Err(Pdf2DocxError)` from library entry points and stored as the
//!   human-readable `error` of a failed [`crate::task::ConversionTask`].
//!
//! * [`CallError`]: **non-fatal**, one call to a model failed (timeout,
//!   API error, empty reply). Stages decide whether to retry, degrade or
//!   escalate it into a [`Pdf2DocxError`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2docx library.
#[derive(Debug, Error)]
pub enum Pdf2DocxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("Input '{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// Upload carries a filename with an extension other than `.pdf`.
    #[error("Unsupported file type '{name}': only .pdf uploads are accepted")]
    UnsupportedFormat { name: String },

    /// Upload is larger than the configured limit.
    #[error("Upload of {size} bytes exceeds the {limit}-byte limit")]
    UploadTooLarge { size: usize, limit: usize },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Backend errors ────────────────────────────────────────────────────
    /// A recognition or conversion dependency is not installed.
    #[error("Backend '{backend}' is unavailable.\n{hint}")]
    BackendUnavailable { backend: String, hint: String },

    /// The backend ran but could not recognise the document.
    #[error("Recognition with '{backend}' failed: {detail}")]
    RecognitionFailed { backend: String, detail: String },

    /// Every extraction path produced empty text.
    #[error("No usable text could be extracted from '{source_name}'")]
    NoUsableText { source_name: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// The document converter exited with an error.
    #[error("Document rendering failed: {detail}")]
    RenderFailed { detail: String },

    /// The document converter did not finish in time.
    #[error("Document rendering timed out after {secs}s")]
    RenderTimeout { secs: u64 },

    /// The converter reported success but left no usable artifact behind.
    #[error("Rendered document '{path}' is missing or empty")]
    MissingArtifact { path: PathBuf },

    // ── Task errors ───────────────────────────────────────────────────────
    /// No task is registered under this identifier.
    #[error("Task '{task_id}' not found")]
    TaskNotFound { task_id: String },

    /// The task exists but has not finished yet.
    #[error("Task '{task_id}' is still {status}; poll its status and retry later")]
    TaskNotReady { task_id: String, status: String },

    /// The task finished with an error, so there is no artifact to return.
    #[error("Task '{task_id}' failed: {error}")]
    TaskFailed { task_id: String, error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other file-system failure in the work directory.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2DocxError {
    /// Wrap an I/O error with the path it happened on.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Pdf2DocxError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means "the selected backend cannot run here".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Pdf2DocxError::BackendUnavailable { .. })
    }
}

/// A non-fatal error for a single model call.
///
/// Retried by [`crate::pipeline::llm::chat_with_retry`]; callers decide what
/// an exhausted retry budget means for their stage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// The call did not return within the per-call timeout.
    #[error("call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider returned an error.
    #[error("API error: {0}")]
    Api(String),

    /// The provider answered with nothing usable.
    #[error("empty reply from model")]
    EmptyReply,
}
