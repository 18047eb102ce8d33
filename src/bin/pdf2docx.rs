//! CLI binary for edgequake-pdf2docx.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and writes the requested artifact.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_pdf2docx::pipeline::input::resolve_input;
use edgequake_pdf2docx::{
    convert, convert_direct, convert_to_file, direct_markdown, inspect, BackendKind,
    ConversionConfig, ConversionOutput, ConversionService, ConvertOptions, OutputFormat,
    PandocRenderer, Stage, TaskObserver, TaskStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI task observer using indicatif ────────────────────────────────────────

/// Spinner that follows one task through its stages and logs each boundary.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Queued");
        bar.set_message("waiting for a worker…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl TaskObserver for CliObserver {
    fn on_status(&self, _task_id: &str, status: TaskStatus) {
        if status == TaskStatus::Processing {
            self.bar.set_prefix("Converting");
        }
    }

    fn on_stage_start(&self, _task_id: &str, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, _task_id: &str, stage: Stage) {
        self.bar.println(format!("  {} {}", green("✓"), stage));
    }

    fn on_stage_degraded(&self, _task_id: &str, stage: Stage, reason: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            yellow("⚠"),
            stage,
            dim(&truncate(reason, 80))
        ));
    }

    fn on_task_failed(&self, _task_id: &str, error: &str) {
        self.bar.println(format!("  {} {}", red("✗"), red(&truncate(error, 80))));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

/// Plain spinner for the inline paths, which have no task events.
fn spinner(prefix: &'static str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix(prefix);
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Structured Markdown to stdout
  pdf2docx scan.pdf

  # Word document (needs pandoc)
  pdf2docx scan.pdf -o scan.docx

  # Document model as JSON
  pdf2docx --format json scan.pdf > scan.json

  # Study notebook with three questions per chapter
  pdf2docx --format notebook --questions 3 textbook.pdf -o textbook.ipynb

  # No model at all: text layer, OCR for scanned pages (needs tesseract)
  pdf2docx --direct --ocr --lang chi_sim+eng scan.pdf -o scan.docx

  # Skip the LLM polish pass
  pdf2docx --no-enhance scan.pdf -o scan.md

  # Inspect PDF metadata (no API key needed)
  pdf2docx --inspect-only scan.pdf

RECOGNITION ENGINES:
  layout      layout detection + line recognition, merged geometrically (default)
  structure   one structure-oriented model pass; tables keep their rows
  text-layer  embedded text only, no model

  Model-backed engines fall back to the text layer when they fail.
  Without any API key, extraction is text-only and enhancement is skipped.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)

EXTERNAL TOOLS:
  pdfium      always
  pandoc      --format docx
  tesseract   --direct --ocr
"#;

/// Recover structure from scanned PDFs and convert them to Markdown or DOCX.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2docx",
    version,
    about = "Recover structure from scanned PDFs and convert them to Markdown, DOCX or notebooks",
    long_about = "Recover headings, paragraphs, tables and reading order from scanned PDF documents \
(local files or URLs). Running headers, footers and page numbers are removed and paragraphs broken \
across pages are joined. Output is Markdown, the document model as JSON, a Word document rendered \
with pandoc, or a Jupyter study notebook.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the result to this file instead of stdout.
    #[arg(short, long, env = "PDF2DOCX_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format. Inferred from the --output extension when omitted.
    #[arg(short, long, env = "PDF2DOCX_FORMAT", value_enum)]
    format: Option<FormatArg>,

    /// Recognition engine.
    #[arg(long, env = "PDF2DOCX_ENGINE", value_enum, default_value = "layout")]
    engine: EngineArg,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Skip the LLM enhancement pass.
    #[arg(long, env = "PDF2DOCX_NO_ENHANCE")]
    no_enhance: bool,

    /// Ask the enhancement pass to add comprehension questions under each section.
    #[arg(long, env = "PDF2DOCX_INSERT_QUESTIONS")]
    insert_questions: bool,

    /// Questions generated per chapter for --format notebook.
    #[arg(long, env = "PDF2DOCX_QUESTIONS", default_value_t = 0)]
    questions: usize,

    /// Convert without models: text layer (and OCR with --ocr), then pandoc.
    #[arg(long)]
    direct: bool,

    /// With --direct: OCR pages that have no usable text layer.
    #[arg(long, requires = "direct")]
    ocr: bool,

    /// OCR language hint, tesseract syntax.
    #[arg(long, env = "PDF2DOCX_LANG", default_value = "chi_sim+eng")]
    lang: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2DOCX_PASSWORD")]
    password: Option<String>,

    /// Path to the pandoc binary (default: looked up on PATH).
    #[arg(long, env = "PDF2DOCX_PANDOC")]
    pandoc: Option<PathBuf>,

    /// Reference DOCX used by pandoc for styles.
    #[arg(long, env = "PDF2DOCX_REFERENCE_DOC")]
    reference_doc: Option<PathBuf>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2DOCX_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Pages recognised concurrently.
    #[arg(short, long, env = "PDF2DOCX_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Retries per model call.
    #[arg(long, env = "PDF2DOCX_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF2DOCX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2DOCX_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Keep task files (uploads/, temp/, outputs/) under this directory.
    #[arg(long, env = "PDF2DOCX_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Disable the spinner.
    #[arg(long, env = "PDF2DOCX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2DOCX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2DOCX_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FormatArg {
    Markdown,
    Json,
    Docx,
    Notebook,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EngineArg {
    Layout,
    Structure,
    TextLayer,
}

impl From<EngineArg> for BackendKind {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Layout => BackendKind::Layout,
            EngineArg::Structure => BackendKind::Structure,
            EngineArg::TextLayer => BackendKind::TextLayer,
        }
    }
}

/// `--format`, else the `--output` extension, else Markdown.
fn resolve_format(cli: &Cli) -> FormatArg {
    if let Some(f) = cli.format {
        return f;
    }
    let ext = cli
        .output
        .as_deref()
        .and_then(Path::extension)
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("docx") => FormatArg::Docx,
        Some("json") => FormatArg::Json,
        Some("ipynb") => FormatArg::Notebook,
        _ => FormatArg::Markdown,
    }
}

/// Binary formats need a file; default to `<input stem>.<ext>` in the cwd.
fn output_or_default(cli: &Cli, ext: &str) -> PathBuf {
    cli.output.clone().unwrap_or_else(|| {
        let stem = Path::new(cli.input.trim_end_matches('/'))
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        PathBuf::from(format!("{stem}.{ext}"))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = resolve_format(&cli);

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs unless --verbose is set.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;
        if format == FormatArg::Json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    // ── Direct mode ──────────────────────────────────────────────────────
    if cli.direct {
        return run_direct(&cli, format, show_progress).await;
    }

    // ── Task mode (DOCX) ─────────────────────────────────────────────────
    if format == FormatArg::Docx {
        return run_task(&cli, show_progress).await;
    }

    // ── Inline mode ──────────────────────────────────────────────────────
    let config = build_config(&cli, None)?;
    let bar = show_progress.then(|| spinner("Converting"));
    let result = match (format, &cli.output) {
        (FormatArg::Notebook, _) => {
            let path = output_or_default(&cli, "ipynb");
            let out = convert_to_file(
                &cli.input,
                &path,
                OutputFormat::Notebook {
                    questions: cli.questions,
                },
                &config,
            )
            .await;
            out.map(|o| (o, Some(path)))
        }
        (FormatArg::Json, Some(path)) => convert_to_file(&cli.input, path, OutputFormat::Json, &config)
            .await
            .map(|o| (o, Some(path.clone()))),
        (_, Some(path)) => convert_to_file(&cli.input, path, OutputFormat::Markdown, &config)
            .await
            .map(|o| (o, Some(path.clone()))),
        (_, None) => convert(&cli.input, &config).await.map(|o| (o, None)),
    };
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let (output, written) = result.context("Conversion failed")?;

    match written {
        Some(path) => {
            if !cli.quiet {
                print_summary(&output, &path);
            }
        }
        None => {
            let text = if format == FormatArg::Json {
                output.document.to_json().context("Failed to serialise document")?
            } else {
                output.markdown.clone()
            };
            write_stdout(&text)?;
            if !cli.quiet {
                print_degraded(&output);
            }
        }
    }
    Ok(())
}

/// Submit the PDF to a [`ConversionService`] and wait for the DOCX.
async fn run_task(cli: &Cli, show_progress: bool) -> Result<()> {
    let output_path = output_or_default(cli, "docx");

    // Without --work-dir the task files live in a scratch directory.
    let scratch = tempfile::tempdir().context("Failed to create work directory")?;
    let work_dir = cli
        .work_dir
        .clone()
        .unwrap_or_else(|| scratch.path().to_path_buf());

    let observer = show_progress.then(CliObserver::new);
    let mut config = build_config(cli, observer.clone().map(|o| o as Arc<dyn TaskObserver>))?;
    config.work_dir = work_dir;

    let input = resolve_input(&cli.input, cli.download_timeout)
        .await
        .context("Failed to read input")?;
    let bytes = tokio::fs::read(input.path())
        .await
        .with_context(|| format!("Failed to read {}", input.path().display()))?;

    let service = ConversionService::from_config(config);
    let accepted = service.submit(&bytes, None).await.context("Upload rejected")?;
    let report = service
        .wait(&accepted.task_id, Duration::from_millis(200))
        .await
        .context("Lost track of the conversion task")?;
    if let Some(ref o) = observer {
        o.finish();
    }

    if report.status == TaskStatus::Failed {
        bail!(
            "Conversion failed: {}",
            report.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    let artifact = service
        .result(&report.task_id)
        .await
        .context("Failed to fetch the rendered document")?;

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&output_path, &artifact.bytes)
        .await
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    if !cli.quiet {
        eprintln!(
            "{}  {}  →  {}",
            green("✔"),
            dim(&format!("{} bytes", artifact.bytes.len())),
            bold(&output_path.display().to_string()),
        );
    }
    Ok(())
}

/// Model-free conversion: text layer plus optional OCR.
async fn run_direct(cli: &Cli, format: FormatArg, show_progress: bool) -> Result<()> {
    let config = build_config(cli, None)?;
    let options = ConvertOptions {
        use_ocr: cli.ocr,
        language: cli.lang.clone(),
        password: cli.password.clone(),
    };
    let input = resolve_input(&cli.input, cli.download_timeout)
        .await
        .context("Failed to read input")?;

    if !matches!(format, FormatArg::Docx | FormatArg::Markdown) {
        bail!("--direct supports markdown and docx output, not {format:?}");
    }
    let bar = show_progress.then(|| spinner("Converting"));
    let result = match format {
        FormatArg::Docx => {
            let path = output_or_default(cli, "docx");
            let renderer = PandocRenderer::from_config(&config);
            convert_direct(input.path(), &path, &options, &config, &renderer)
                .await
                .map(|p| (None, Some(p)))
        }
        _ => direct_markdown(input.path(), &options, &config)
            .await
            .map(|md| (Some(md), None)),
    };
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    match result.context("Direct conversion failed")? {
        (Some(md), _) => match &cli.output {
            Some(path) => {
                tokio::fs::write(path, &md)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if !cli.quiet {
                    eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
                }
            }
            None => write_stdout(&md)?,
        },
        (None, Some(path)) => {
            if !cli.quiet {
                eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        (None, None) => {}
    }
    Ok(())
}

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

fn print_degraded(output: &ConversionOutput) {
    for (stage, reason) in &output.degraded {
        eprintln!("{} {} fell back: {}", yellow("⚠"), stage, dim(&truncate(reason, 100)));
    }
}

fn print_summary(output: &ConversionOutput, path: &Path) {
    print_degraded(output);
    eprintln!(
        "{}  {} pages  {} blocks  {}ms  →  {}",
        if output.degraded.is_empty() {
            green("✔")
        } else {
            yellow("⚠")
        },
        output.document.pages.len(),
        output.document.block_count(),
        output.duration_ms,
        bold(&path.display().to_string()),
    );
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, observer: Option<Arc<dyn TaskObserver>>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .backend(cli.engine.into())
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .enhance(!cli.no_enhance)
        .insert_questions(cli.insert_questions);

    if let Some(ref p) = cli.pandoc {
        builder = builder.pandoc_path(p);
    }
    if let Some(ref r) = cli.reference_doc {
        builder = builder.reference_doc(r);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(o) = observer {
        builder = builder.observer(o);
    }

    let mut config = builder.build().context("Invalid configuration")?;
    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();
    Ok(config)
}
