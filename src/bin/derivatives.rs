//! CLI binary for fileset-derivatives.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints the generation report.

use anyhow::{Context, Result};
use clap::Parser;
use fileset_derivatives::{
    generate_with_shell, run_job, DerivativeKind, GenerationProgressCallback, GenerationReport,
    MediaCategory, PipelineConfig, ProgressCallback, RetryPolicy, RoutineState, Shell,
    SourceDescriptor,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per derivative. Page derivatives
/// arrive out of order when pages run concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} derivatives  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.reset_eta();
    }
}

fn label(kind: DerivativeKind, page: Option<usize>) -> String {
    match page {
        Some(p) => format!("{kind} (page {})", p + 1),
        None => kind.to_string(),
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_generation_start(&self, category: MediaCategory, expected: Option<usize>) {
        match expected {
            Some(total) => {
                self.activate_bar(total);
                self.bar.set_message(String::new());
            }
            None => self.bar.set_message(format!("inspecting {category}…")),
        }
    }

    fn on_page_count(&self, pages: usize, expected: usize) {
        self.activate_bar(expected);
        self.bar.set_message(format!("{pages} pages"));
    }

    fn on_state_change(&self, state: RoutineState) {
        let prefix = match state {
            RoutineState::NotStarted => "Waiting",
            RoutineState::Preprocessing => "Preprocessing",
            RoutineState::GeneratingDerivatives => "Generating",
            RoutineState::Done => "Done",
            RoutineState::Failed => "Failed",
        };
        self.bar.set_prefix(prefix);
    }

    fn on_derivative_complete(&self, kind: DerivativeKind, page: Option<usize>) {
        self.bar
            .println(format!("  {} {}", green("✓"), label(kind, page)));
        self.bar.inc(1);
    }

    fn on_derivative_error(&self, kind: DerivativeKind, page: Option<usize>, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            label(kind, page),
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_generation_complete(&self, generated: usize, failed: usize) {
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} derivatives generated",
                green("✔"),
                bold(&generated.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} derivatives generated  ({} failed)",
                if generated == 0 { red("✘") } else { cyan("⚠") },
                bold(&generated.to_string()),
                generated + failed,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Thumbnail + tile pyramid for a scanned image
  derivatives --mime image/jp2 --root /srv/derivatives scan.jp2

  # Every page of a PDF, two pages at a time
  derivatives --mime application/pdf --page-concurrency 2 book.pdf

  # Retry the whole invocation like the job queue does
  derivatives --mime application/pdf --retries 11 book.pdf

  # List existing tile pyramids for a source
  derivatives --mime application/pdf --id f4752g72m --list jp2 book.pdf

  # JSON report
  derivatives --mime video/mp4 --json clip.mp4 > report.json

EXTERNAL TOOLS (default templates, override with --config):
  opj_decompress / opj_compress   JPEG 2000 decode and tile pyramids
  convert (ImageMagick)           raster conversion, PDF page rasterisation
  gm (GraphicsMagick)             thumbnails
  pdfinfo / pdftotext (poppler)   page count and full text
  soffice (LibreOffice)           office documents to PDF
  ffmpeg                          audio/video renditions and poster frames

ENVIRONMENT VARIABLES:
  DERIVATIVES_ROOT        Default for --root
  DERIVATIVES_CONFIG      Default for --config
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Generate thumbnails, tile pyramids, page bitmaps, full text and
/// renditions for an uploaded file.
#[derive(Parser, Debug)]
#[command(
    name = "derivatives",
    version,
    about = "Generate access derivatives for an uploaded file",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Source file.
    input: PathBuf,

    /// Declared MIME type of the source (e.g. image/jp2, application/pdf).
    #[arg(short, long, env = "DERIVATIVES_MIME")]
    mime: String,

    /// Identifier keying derivative locations. Default: digest of the canonical input path.
    #[arg(long)]
    id: Option<String>,

    /// External reference passed to the text extractor.
    #[arg(long)]
    uri: Option<String>,

    /// Directory derivatives are written under.
    #[arg(long, env = "DERIVATIVES_ROOT")]
    root: Option<PathBuf>,

    /// Prefix for derivative location URLs.
    #[arg(long, env = "DERIVATIVES_URL_SCHEME")]
    scheme: Option<String>,

    /// JSON configuration file (tool templates, sizes, renditions).
    #[arg(short, long, env = "DERIVATIVES_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for temporary bitmaps.
    #[arg(long, env = "DERIVATIVES_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// PDF pages processed at once.
    #[arg(long, env = "DERIVATIVES_PAGE_CONCURRENCY",
          value_parser = clap::value_parser!(usize))]
    page_concurrency: Option<usize>,

    /// Re-run the whole invocation up to N times on retryable failure.
    #[arg(long, env = "DERIVATIVES_RETRIES", default_value_t = 0)]
    retries: u32,

    /// Print existing derivative URLs with this extension and exit.
    #[arg(long, value_name = "EXT")]
    list: Option<String>,

    /// Print the generation report as JSON.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DERIVATIVES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.list.is_none();
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

    // ── Source and config ────────────────────────────────────────────────
    let mut source = SourceDescriptor::new(&cli.input, cli.mime.clone())
        .with_context(|| format!("Cannot use {}", cli.input.display()))?;
    if let Some(ref id) = cli.id {
        source = source.with_id(id);
    }
    if let Some(ref uri) = cli.uri {
        source = source.with_uri(uri.clone());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── List mode ────────────────────────────────────────────────────────
    if let Some(ref ext) = cli.list {
        let urls = fileset_derivatives::sorted_derivative_urls(&source, &config, ext)
            .context("Failed to enumerate derivatives")?;
        for url in urls {
            println!("{url}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let shell = Shell::system();
    let result = if cli.retries > 0 {
        run_job(&source, &config, shell, RetryPolicy::new(cli.retries)).await
    } else {
        generate_with_shell(&source, &config, shell).await
    };
    let report = result.context("Derivative generation failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet && !show_progress {
        print_summary(&report);
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Config file (if any), then CLI overrides.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut config = match cli.config {
        Some(ref path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(ref root) = cli.root {
        config.derivatives_root = root.clone();
    }
    if let Some(ref scheme) = cli.scheme {
        config.url_scheme = scheme.clone();
    }
    if let Some(ref dir) = cli.temp_dir {
        config.temp_dir = Some(dir.clone());
    }
    if let Some(n) = cli.page_concurrency {
        config.page_concurrency = n;
    }
    config.progress_callback = progress;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_summary(report: &GenerationReport) {
    eprintln!(
        "{} {} ({}): {} written, {} failed in {}ms",
        if report.is_success() { green("✔") } else { red("✘") },
        report.source.display(),
        report.category,
        report.stats.generated,
        report.stats.failed,
        report.stats.total_duration_ms,
    );
    for outcome in &report.outcomes {
        match outcome.error {
            None => eprintln!(
                "  {} {}  {}",
                green("✓"),
                label(outcome.kind, outcome.page),
                dim(&outcome.location.display().to_string())
            ),
            Some(ref e) => eprintln!(
                "  {} {}  {}",
                red("✗"),
                label(outcome.kind, outcome.page),
                red(&e.to_string())
            ),
        }
    }
}
