//! CLI binary for pagewise.
//!
//! A thin shim over the library crate that maps CLI flags (layered over an
//! optional TOML file) to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pagewise::{
    check_service, run, ContentCategory, ExtractionConfig, PageFailure, PageProgress,
    PageSelection, ProgressCallback,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished page.
struct CliProgress {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Probing service and rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn clear(&self) {
        self.bar.finish_and_clear();
    }

    fn elapsed_secs(&self, page: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PageProgress for CliProgress {
    fn on_run_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page, Instant::now());
        }
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, page: usize, total: usize, category: ContentCategory) {
        let secs = self.elapsed_secs(page);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page,
            total,
            dim(category.as_str()),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: usize, total: usize, failure: &PageFailure) {
        let secs = self.elapsed_secs(page);
        let mut msg = failure.to_string();
        if msg.chars().count() > 80 {
            msg = msg.chars().take(79).collect::<String>() + "\u{2026}";
        }
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

    fn on_run_complete(&self, total_pages: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(succeeded);
        if failed == 0 {
            eprintln!(
                "{} {} pages extracted successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages extracted  ({} failed, see report)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r###"EXAMPLES:
  # Extract every page into ./scan.md, ./scan_figures/, ./scan.report.json
  pagewise scan.pdf

  # Different output directory and model
  pagewise scan.pdf -o out/ --model llava:13b

  # First ten pages, two requests in flight
  pagewise --max-pages 10 --concurrency 2 book.pdf

  # Only check that the service is up and the model is pulled
  pagewise --check scan.pdf

  # Settings from a file, flags still win
  pagewise --config pagewise.toml --timeout 300 scan.pdf

OUTPUT:
  <stem>.md            one "## Page N (category)" section per page, failed
                       pages as placeholders, then a processing report
  <stem>_figures/      page-NNNN-fig-NN.<ext> figure files
  <stem>.report.json   the processing report

ENVIRONMENT VARIABLES:
  PAGEWISE_URL        Inference service base URL (default http://localhost:11434)
  PAGEWISE_MODEL      Vision model (default llama3.2-vision)
  PDFIUM_LIB_PATH     Path to an existing libpdfium
  RUST_LOG            Overrides the log filter

SETUP:
  1. Start the service:  ollama serve
  2. Pull a model:       ollama pull llama3.2-vision
  3. Extract:            pagewise document.pdf
"###;

/// Extract scanned PDFs page by page through a local vision model.
#[derive(Parser, Debug)]
#[command(
    name = "pagewise",
    version,
    about = "Extract scanned PDFs page by page through a local vision model",
    long_about = "Classify every page of a PDF (text, table, figure, mixed) with a locally hosted \
vision model, extract it with a category-specific prompt, and merge the pages into one Markdown \
document with a report of any page that could not be processed.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to extract.
    input: PathBuf,

    /// Directory for the document, figures, and report.
    #[arg(short, long, env = "PAGEWISE_OUTPUT_DIR", default_value = ".")]
    output: PathBuf,

    /// TOML configuration file; flags override its values.
    #[arg(long, env = "PAGEWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Vision model identifier.
    #[arg(long, env = "PAGEWISE_MODEL")]
    model: Option<String>,

    /// Inference service base URL.
    #[arg(long, env = "PAGEWISE_URL")]
    url: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "PAGEWISE_TIMEOUT")]
    timeout: Option<u64>,

    /// Total attempts per request on connection failure.
    #[arg(long, env = "PAGEWISE_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PAGEWISE_PAGES", conflicts_with = "max_pages")]
    pages: Option<String>,

    /// Process only the first N pages.
    #[arg(long, env = "PAGEWISE_MAX_PAGES")]
    max_pages: Option<usize>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PAGEWISE_DPI",
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: Option<u32>,

    /// Requests in flight at once (1–4). Output order is unaffected.
    #[arg(short, long, env = "PAGEWISE_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Title heading for the merged document.
    #[arg(long)]
    title: Option<String>,

    /// Do not write figure files.
    #[arg(long, env = "PAGEWISE_NO_FIGURES")]
    no_figures: bool,

    /// Print the assembled document as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Only probe the service, then exit.
    #[arg(long)]
    check: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAGEWISE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAGEWISE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAGEWISE_QUIET", conflicts_with = "verbose")]
    quiet: bool,

    /// Also write plain-text logs to this file.
    #[arg(long, env = "PAGEWISE_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = real_main().await {
        eprintln!("{} {e:#}", red("error:"));
        std::process::exit(1);
    }
}

async fn real_main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs on the terminal.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.check;
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    init_logging(level, cli.log_file.as_ref())?;

    let cli_progress = show_progress.then(CliProgress::new);
    run_with_progress(&cli, cli_progress, show_progress).await
}

/// Run the command; a fatal error stops and clears the bar before it is printed.
async fn run_with_progress(
    cli: &Cli,
    cli_progress: Option<Arc<CliProgress>>,
    show_progress: bool,
) -> Result<()> {
    let progress = cli_progress
        .clone()
        .map(|p| p as Arc<dyn PageProgress>);
    let result = execute(cli, progress, show_progress).await;
    if result.is_err() {
        if let Some(ref p) = cli_progress {
            p.clear();
        }
    }
    result
}

async fn execute(cli: &Cli, progress: Option<ProgressCallback>, show_progress: bool) -> Result<()> {
    let config = build_config(cli, progress)?;

    // ── Probe-only mode ──────────────────────────────────────────────────
    if cli.check {
        let status = check_service(&config).await?;
        if cli.json {
            println!(
                "{}",
                serde_json::json!({
                    "service_url": config.service_url,
                    "model": config.model,
                    "model_available": status.model_available,
                    "models": status.models,
                })
            );
        } else if !cli.quiet {
            let mark = if status.model_available { green("✔") } else { cyan("⚠") };
            eprintln!("{mark} {} is up", bold(&config.service_url));
            eprintln!(
                "   model '{}' {}",
                config.model,
                if status.model_available {
                    "available".to_string()
                } else {
                    red("not listed")
                }
            );
            if !status.models.is_empty() {
                eprintln!("   {}", dim(&status.models.join(", ")));
            }
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let out = run(&cli.input, &cli.output, &config).await?;

    if cli.json {
        let json =
            serde_json::to_string_pretty(&out.document).context("Failed to serialise document")?;
        println!("{json}");
    }

    if !cli.quiet {
        let report = &out.document.report;
        if !show_progress && !cli.json {
            eprintln!(
                "Extracted {}/{} pages ({} failed)",
                report.succeeded_count,
                report.total_pages,
                report.failed_count()
            );
        }
        eprintln!("   → {}", bold(&out.paths.document.display().to_string()));
        if let Some(ref dir) = out.paths.figures_dir {
            eprintln!(
                "   → {}  {}",
                dir.display(),
                dim(&format!("{} figures", out.paths.figure_files.len()))
            );
        }
        eprintln!("   → {}", out.paths.report.display());
    }

    Ok(())
}

fn init_logging(level: &str, log_file: Option<&PathBuf>) -> Result<()> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new("debug")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(filter()),
        )
        .with(file_layer)
        .init();
    Ok(())
}

/// Layer CLI flags over the config file (or defaults).
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let base = match cli.config {
        Some(ref path) => ExtractionConfig::from_toml_file(path)?,
        None => ExtractionConfig::default(),
    };
    let mut builder = base.into_builder();

    if let Some(ref url) = cli.url {
        builder = builder.service_url(url);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if let Some(n) = cli.max_attempts {
        builder = builder.max_attempts(n);
    }
    if let Some(ref spec) = cli.pages {
        builder = builder.pages(PageSelection::parse(spec)?);
    }
    if let Some(n) = cli.max_pages {
        builder = builder.pages(PageSelection::First(n));
    }
    if let Some(dpi) = cli.dpi {
        builder = builder.dpi(dpi);
    }
    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref title) = cli.title {
        builder = builder.document_title(title);
    }
    if cli.no_figures {
        builder = builder.save_figures(false);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pagewise").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_map_to_config() {
        let cli = parse(&[
            "scan.pdf",
            "--model",
            "llava",
            "--timeout",
            "30",
            "--max-pages",
            "4",
            "--no-figures",
        ]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.model, "llava");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.pages, PageSelection::First(4));
        assert!(!config.save_figures);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn pages_and_max_pages_conflict() {
        let r = Cli::try_parse_from(["pagewise", "a.pdf", "--pages", "1-2", "--max-pages", "3"]);
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn fatal_error_clears_the_progress_bar() {
        let cli = parse(&["/definitely/not/here.pdf", "--url", "http://127.0.0.1:9"]);
        let bar = CliProgress::new();
        let err = run_with_progress(&cli, Some(bar.clone()), true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {err}");
        assert!(bar.bar.is_finished());
    }

    #[test]
    fn bad_concurrency_is_rejected() {
        let cli = parse(&["scan.pdf", "--concurrency", "9"]);
        assert!(build_config(&cli, None).is_err());
    }
}
