//! Configuration types for PDF structure recovery and conversion.
//!
//! All behaviour is controlled through [`ConversionConfig`], built via its
//! [`ConversionConfigBuilder`]. The direct conversion path additionally takes
//! per-request [`ConvertOptions`].

use crate::error::Pdf2DocxError;
use crate::progress::TaskObserver;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for recognition, enhancement, rendering and task handling.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2docx::{BackendKind, ConversionConfig};
///
/// let config = ConversionConfig::builder()
///     .dpi(150)
///     .backend(BackendKind::Layout)
///     .max_retries(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Pages recognised concurrently by model-backed backends. Default: 4.
    pub concurrency: usize,

    /// Recognition backend to try first. Default: [`BackendKind::Layout`].
    pub backend: BackendKind,

    /// LLM model identifier. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for recognition calls. Default: 0.1.
    pub temperature: f32,

    /// Sampling temperature for the enhancement call. Default: 0.3.
    pub enhance_temperature: f32,

    /// Maximum tokens a model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Per-model-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Retries after the first attempt of a model call. Default: 2.
    pub max_retries: u32,

    /// Fixed delay between retries in milliseconds. Default: 3000.
    pub retry_delay_ms: u64,

    /// Run the enhancement stage. Default: true.
    pub enhance: bool,

    /// Ask the enhancement call to add two comprehension questions after
    /// each `##` heading. Default: false.
    pub insert_questions: bool,

    /// Header/footer/page-number heuristics.
    pub filter: FilterThresholds,

    /// Text given to figure regions with no recognised text. Default: "[image]".
    pub figure_placeholder: String,

    /// Explicit pandoc binary. If None, `pandoc` is looked up on `PATH`.
    pub pandoc_path: Option<PathBuf>,

    /// Reference DOCX passed to pandoc for styling, when present on disk.
    pub reference_doc: Option<PathBuf>,

    /// Timeout for one document-rendering invocation in seconds. Default: 120.
    pub render_timeout_secs: u64,

    /// Root for `uploads/`, `temp/` and `outputs/`. Default: "work".
    pub work_dir: PathBuf,

    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Registry bound; the oldest finished tasks are evicted beyond it. Default: 1024.
    pub max_tasks: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Observer notified of task status changes and stage boundaries.
    pub observer: Option<Arc<dyn TaskObserver>>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            concurrency: 4,
            backend: BackendKind::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            enhance_temperature: 0.3,
            max_tokens: 4096,
            api_timeout_secs: 120,
            max_retries: 2,
            retry_delay_ms: 3000,
            enhance: true,
            insert_questions: false,
            filter: FilterThresholds::default(),
            figure_placeholder: "[image]".to_string(),
            pandoc_path: None,
            reference_doc: None,
            render_timeout_secs: 120,
            work_dir: PathBuf::from("work"),
            max_upload_bytes: 50 * 1024 * 1024,
            max_tasks: 1024,
            password: None,
            download_timeout_secs: 120,
            observer: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("enhance", &self.enhance)
            .field("insert_questions", &self.insert_questions)
            .field("filter", &self.filter)
            .field("pandoc_path", &self.pandoc_path)
            .field("work_dir", &self.work_dir)
            .field("max_tasks", &self.max_tasks)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.work_dir.join("uploads")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.work_dir.join("temp")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.work_dir.join("outputs")
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.config.backend = kind;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn enhance_temperature(mut self, t: f32) -> Self {
        self.config.enhance_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn enhance(mut self, v: bool) -> Self {
        self.config.enhance = v;
        self
    }

    pub fn insert_questions(mut self, v: bool) -> Self {
        self.config.insert_questions = v;
        self
    }

    pub fn filter(mut self, thresholds: FilterThresholds) -> Self {
        self.config.filter = thresholds;
        self
    }

    pub fn figure_placeholder(mut self, text: impl Into<String>) -> Self {
        self.config.figure_placeholder = text.into();
        self
    }

    pub fn pandoc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pandoc_path = Some(path.into());
        self
    }

    pub fn reference_doc(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.reference_doc = Some(path.into());
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn max_tasks(mut self, n: usize) -> Self {
        self.config.max_tasks = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2DocxError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(Pdf2DocxError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_upload_bytes == 0 {
            return Err(Pdf2DocxError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.max_tasks == 0 {
            return Err(Pdf2DocxError::InvalidConfig("max_tasks must be ≥ 1".into()));
        }
        c.filter.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which recognition backend to run.
///
/// | Kind | Passes | Labels |
/// |------|--------|--------|
/// | `Layout` | layout regions + text lines, merged geometrically (default) | full label table |
/// | `Structure` | one structure-oriented pass, tables carry rows | title/text/table/figure/list |
/// | `TextLayer` | pdfium text layer, no model | section/paragraph by shape |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Layout,
    Structure,
    TextLayer,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Layout => "layout",
            BackendKind::Structure => "structure",
            BackendKind::TextLayer => "text-layer",
        }
    }
}

/// Tunable thresholds for the artifact filter.
///
/// Defaults are provisional: a 10% margin band, page numbers under 10
/// characters and margin paragraphs under 50 characters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterThresholds {
    /// Fraction of page height treated as header (top) or footer (bottom) zone.
    pub margin_ratio: f64,
    /// Trimmed text shorter than this is checked against the page-number patterns.
    pub page_number_max_len: usize,
    /// Paragraphs in a margin zone shorter than this are candidates for removal.
    pub margin_text_max_len: usize,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        Self {
            margin_ratio: 0.10,
            page_number_max_len: 10,
            margin_text_max_len: 50,
        }
    }
}

impl FilterThresholds {
    pub fn validate(&self) -> Result<(), Pdf2DocxError> {
        if !(0.0..0.5).contains(&self.margin_ratio) {
            return Err(Pdf2DocxError::InvalidConfig(format!(
                "margin_ratio must be in [0, 0.5), got {}",
                self.margin_ratio
            )));
        }
        Ok(())
    }
}

/// Per-request options for the direct PDF → document path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Send image-only pages through OCR instead of plain text extraction.
    pub use_ocr: bool,
    /// Recognition language hint, tesseract syntax (e.g. "chi_sim+eng").
    pub language: String,
    /// PDF user password.
    pub password: Option<String>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            use_ocr: false,
            language: "chi_sim+eng".to_string(),
            password: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ConversionConfig::default();
        assert_eq!(c.dpi, 150);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.retry_delay_ms, 3000);
        assert_eq!(c.api_timeout_secs, 120);
        assert_eq!(c.filter.margin_ratio, 0.10);
        assert_eq!(c.filter.page_number_max_len, 10);
        assert_eq!(c.filter.margin_text_max_len, 50);
        assert_eq!(c.backend, BackendKind::Layout);
        assert_eq!(c.uploads_dir(), PathBuf::from("work/uploads"));
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = ConversionConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 72);
    }

    #[test]
    fn builder_rejects_bad_margin() {
        let err = ConversionConfig::builder()
            .filter(FilterThresholds {
                margin_ratio: 0.7,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("margin_ratio"));
    }

    #[test]
    fn builder_rejects_zero_task_bound() {
        assert!(ConversionConfig::builder().max_tasks(0).build().is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let c = ConversionConfig::builder().password("hunter2").build().unwrap();
        let s = format!("{c:?}");
        assert!(!s.contains("hunter2"));
    }

    #[test]
    fn convert_options_default_language() {
        let o = ConvertOptions::default();
        assert!(!o.use_ocr);
        assert_eq!(o.language, "chi_sim+eng");
    }
}
