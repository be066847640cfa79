//! CLI binary for par-ocr.
//!
//! A thin shim over the library crate: `process` maps flags and environment
//! variables to an `OcrConfig` and runs one document into a local outbox
//! directory; `outbox` replays the outbox watcher over files on disk.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use par_ocr::{
    process_document, DirectorySink, ExtractionProgress, LlmProvider, ModelConfig, OcrConfig,
    OutboxOutcome, OutboxWatcher, PageImageFormat, PricingDisplay, ProgressHandle, ResultSink,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page. Pages finish out of order,
/// so per-page start times are keyed by page number.
struct CliProgress {
    bar: ProgressBar,
    start_times: Mutex<HashMap<u32, Instant>>,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading source…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, page: u32) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&page)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgress for CliProgress {
    fn on_extraction_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page: u32, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(page, Instant::now());
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, page: u32, total: usize, content_len: usize) {
        let secs = self.elapsed_secs(page);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page,
            total,
            dim(&format!("{content_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: u32, total: usize, error: &str) {
        let secs = self.elapsed_secs(page);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!("{} {} page(s) extracted", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} page(s) extracted  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a PDF into ./outbox-data/outbox/<request-id>/
  par-ocr process inbox/report.pdf --outbox ./outbox-data

  # Anthropic, cost summary only
  par-ocr process scan.png --provider anthropic --pricing price

  # Local llama.cpp server
  par-ocr process scan.jpg --provider llamacpp --base-url http://127.0.0.1:8080/v1

  # Replay the outbox watcher over published files
  par-ocr outbox ./outbox-data/outbox/*/*.md

ENVIRONMENT VARIABLES:
  AI_PROVIDER        openai | anthropic | bedrock | llamacpp (prefixes accepted)
  AI_MODEL           Model override (default: provider's vision model)
  AI_BASE_URL        OpenAI-compatible endpoint
  AI_TIMEOUT_SECS    Per-page model call timeout
  MAX_OCR_WORKERS    Concurrent page calls (0 = min(pages, min(32, cpus + 4)))
  PRICING            none | price | details
  OUTPUT_KEY         Prefix for published keys (default: outbox/<request-id>)
  REQUEST_ID         Request identifier (default: generated)
  OPENAI_API_KEY     OpenAI credential
  ANTHROPIC_API_KEY  Anthropic credential
  BEDROCK_API_KEY    Bedrock credential
  PDFIUM_LIB_PATH    Directory containing libpdfium
"#;

/// Extract PDFs and images to Markdown with vision LLMs, one page per call.
#[derive(Parser, Debug)]
#[command(
    name = "par-ocr",
    version,
    about = "Extract PDFs and images to Markdown with vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAR_OCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAR_OCR_QUIET")]
    quiet: bool,

    /// Print structured JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one document through the OCR pipeline.
    Process(ProcessArgs),
    /// Run the outbox watcher over files already on disk.
    Outbox(OutboxArgs),
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Local file path or HTTP/HTTPS URL (.pdf, .jpg, .jpeg, .png).
    input: String,

    /// Directory that receives every published artifact.
    #[arg(long, env = "OUTBOX_DIR", default_value = "./outbox-data")]
    outbox: PathBuf,

    /// LLM provider.
    #[arg(long, env = "AI_PROVIDER", default_value = "openai", value_parser = parse_provider)]
    provider: LlmProvider,

    /// Model name; empty selects the provider's vision model.
    #[arg(long, env = "AI_MODEL")]
    model: Option<String>,

    /// OpenAI-compatible endpoint, e.g. http://127.0.0.1:8080/v1.
    #[arg(long, env = "AI_BASE_URL")]
    base_url: Option<String>,

    /// Concurrent page calls; 0 selects the default bound.
    #[arg(long, env = "MAX_OCR_WORKERS")]
    max_workers: Option<usize>,

    /// Cost report verbosity: none, price, details.
    #[arg(long, env = "PRICING", default_value = "details", value_parser = parse_pricing)]
    pricing: PricingDisplay,

    /// Price usage at the batch discount.
    #[arg(long)]
    batch_pricing: bool,

    /// Prefix for published keys (default: outbox/<request-id>).
    #[arg(long, env = "OUTPUT_KEY")]
    output_key: Option<String>,

    /// Request identifier used in the default output prefix.
    #[arg(long, env = "REQUEST_ID")]
    request_id: Option<String>,

    /// Per-page model call timeout in seconds.
    #[arg(long, env = "AI_TIMEOUT_SECS")]
    timeout: Option<u64>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "AI_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max output tokens per page.
    #[arg(long, env = "AI_MAX_TOKENS")]
    max_tokens: Option<u32>,

    /// Rendering DPI for PDF pages (72–400).
    #[arg(long, default_value_t = 150, value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Encoding of rendered PDF pages: png or jpeg.
    #[arg(long, default_value = "png")]
    page_format: PageImageFormat,

    /// Text file with a custom system prompt.
    #[arg(long)]
    system_prompt: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, default_value_t = 120)]
    download_timeout: u64,

    /// Do not publish the copy of the source document.
    #[arg(long)]
    no_source_copy: bool,

    /// Do not publish page images.
    #[arg(long)]
    no_page_images: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct OutboxArgs {
    /// Files to hand to the watcher, as if they had landed in the outbox.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Forward final documents into this directory.
    #[arg(long)]
    forward: Option<PathBuf>,
}

fn parse_provider(s: &str) -> Result<LlmProvider, String> {
    s.parse::<LlmProvider>().map_err(|e| e.to_string())
}

fn parse_pricing(s: &str) -> Result<PricingDisplay, String> {
    s.parse::<PricingDisplay>()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless verbose output was asked for.
    let show_progress = match &cli.command {
        Command::Process(args) => !cli.quiet && !args.no_progress && !cli.json,
        Command::Outbox(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Process(ref args) => run_process(&cli, args, show_progress).await,
        Command::Outbox(ref args) => run_outbox(&cli, args).await,
    }
}

async fn run_process(cli: &Cli, args: &ProcessArgs, show_progress: bool) -> Result<()> {
    let request_id = args.request_id.clone().unwrap_or_else(new_request_id);
    let progress: Option<ProgressHandle> = if show_progress {
        Some(CliProgress::new() as ProgressHandle)
    } else {
        None
    };
    let config = build_config(args, progress).await?;

    let sink: Arc<dyn ResultSink> = Arc::new(DirectorySink::new(&args.outbox));
    let output = process_document(&args.input, &request_id, &config, sink)
        .await
        .context("OCR failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    if !cli.quiet {
        let final_path = args.outbox.join(&output.final_key);
        eprintln!(
            "{}  {}/{} pages  {}ms  →  {}",
            if output.stats.failed_pages == 0 { green("✔") } else { cyan("⚠") },
            output.stats.succeeded_pages,
            output.stats.total_pages,
            output.stats.total_duration_ms,
            bold(&final_path.display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out  ·  ${:.4}",
            dim(&output.usage.input_tokens.to_string()),
            dim(&output.usage.output_tokens.to_string()),
            output.usage.total_cost,
        );
    }
    Ok(())
}

/// Map CLI args to `OcrConfig`.
async fn build_config(args: &ProcessArgs, progress: Option<ProgressHandle>) -> Result<OcrConfig> {
    let mut model = ModelConfig::builder(args.provider)
        .model_name(args.model.clone().unwrap_or_default())
        .base_url(args.base_url.clone())
        .temperature(args.temperature)
        .timeout_secs(args.timeout);
    if let Some(max_tokens) = args.max_tokens {
        model = model.max_tokens(max_tokens);
    }
    let model = model.build().context("Invalid model configuration")?;

    let mut builder = OcrConfig::builder(model)
        .max_workers(args.max_workers)
        .pricing(args.pricing)
        .batch_pricing(args.batch_pricing)
        .dpi(args.dpi)
        .page_format(args.page_format)
        .download_timeout_secs(args.download_timeout)
        .output_prefix(args.output_key.clone())
        .publish_source_copy(!args.no_source_copy)
        .publish_page_images(!args.no_page_images);

    if let Some(path) = &args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(progress) = progress {
        builder = builder.progress(progress);
    }

    builder.build().context("Invalid configuration")
}

async fn run_outbox(cli: &Cli, args: &OutboxArgs) -> Result<()> {
    let mut watcher = OutboxWatcher::new();
    if let Some(dir) = &args.forward {
        watcher = watcher.with_forward(Arc::new(DirectorySink::new(dir)));
    }

    let mut outcomes = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        // Forwarded under the bare file name.
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        let outcome = watcher
            .handle(&name, &content)
            .await
            .with_context(|| format!("Failed to handle {name}"))?;
        outcomes.push(outcome);
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&outcomes).context("Failed to serialise outcomes")?;
        println!("{json}");
    } else if !cli.quiet {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for outcome in &outcomes {
            match outcome {
                OutboxOutcome::Skipped { name } => writeln!(out, "{}  {}", dim("skip"), name)?,
                OutboxOutcome::Processed { name, forwarded, .. } => writeln!(
                    out,
                    "{}  {}{}",
                    green("done"),
                    name,
                    if *forwarded { dim("  (forwarded)") } else { String::new() }
                )?,
            }
        }
    }

    Ok(())
}

/// `req-` plus the last 8 hex digits of a v4 UUID.
fn new_request_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("req-{}", &id[id.len() - 8..])
}
