//! CLI binary for schematize-pipeline.
//!
//! A thin shim over the library crate: maps CLI flags to `PipelineConfig`,
//! walks the document through every stage and prints the export link.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use schematize_pipeline::{
    drive, save_document, AutoView, DocumentSlice, PipelineConfig, PipelineDocument,
    PipelineError, SchematizedSection, SourceFile, Stage, StageView, StepController, ViewRequest,
    ViewStatus,
};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
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

// ── Terminal stage view ──────────────────────────────────────────────────────

/// Wraps [`AutoView`] and reports each stage on the terminal: a spinner while
/// the call is outstanding, one log line per outcome.
struct CliView {
    inner: AutoView,
    /// Spinner anchored at the bottom of the terminal; `None` with `--no-progress`.
    bar: Option<ProgressBar>,
    started: Option<Instant>,
    quiet: bool,
}

impl CliView {
    fn new(inner: AutoView, show_progress: bool, quiet: bool) -> Self {
        let bar = show_progress.then(|| {
            let bar = ProgressBar::new_spinner();
            let style =
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        Self {
            inner,
            bar,
            started: None,
            quiet,
        }
    }

    fn println(&self, line: String) {
        if self.quiet {
            return;
        }
        match self.bar {
            Some(ref bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }

    fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

impl StageView for CliView {
    fn render(&mut self, slice: DocumentSlice<'_>, status: &ViewStatus) {
        self.inner.render(slice, status);
        if let Some(ref bar) = self.bar {
            let stage = slice.stage();
            bar.set_prefix(format!(
                "[{}/{}] {}",
                stage.index() + 1,
                Stage::ALL.len(),
                stage.title()
            ));
            bar.set_message(stage.description());
        }
    }

    fn request(&mut self, slice: DocumentSlice<'_>, status: &ViewStatus) -> Option<ViewRequest> {
        let request = self.inner.request(slice, status)?;
        self.started = Some(Instant::now());
        Some(request)
    }

    fn observe(&mut self, stage: Stage, outcome: &Result<PipelineDocument, PipelineError>) {
        self.inner.observe(stage, outcome);
        let elapsed = self
            .started
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let line = match outcome {
            Ok(doc) => format!(
                "  {} {:<10} {:<24}  {}",
                green("✓"),
                stage.title(),
                dim(&summarize(stage, doc)),
                dim(&format!("{elapsed:.1}s")),
            ),
            Err(e) => {
                // Truncate very long error messages to keep output tidy.
                let msg = e.to_string();
                let msg = match msg.char_indices().nth(80) {
                    Some((cut, _)) => format!("{}\u{2026}", &msg[..cut]),
                    None => msg,
                };
                format!(
                    "  {} {:<10} {}  {}",
                    red("✗"),
                    stage.title(),
                    red(&msg),
                    dim(&format!("{elapsed:.1}s")),
                )
            }
        };
        self.println(line);
    }

    fn backoff(&self) -> Option<Duration> {
        let delay = self.inner.backoff()?;
        if let Some(ref bar) = self.bar {
            bar.set_message(format!("retrying in {:.1}s…", delay.as_secs_f64()));
        }
        Some(delay)
    }
}

/// One-line description of what a stage produced.
fn summarize(stage: Stage, doc: &PipelineDocument) -> String {
    match stage {
        Stage::Upload | Stage::Structure => format!("{} sections", doc.structure.len()),
        Stage::Schematization => format!("{} schematized", doc.schematization.len()),
        Stage::Edit => format!("{} saved", doc.schematization.len()),
        Stage::Export => match doc.export_ref {
            Some(ref r) => format!("{} ready", r.format),
            None => "done".to_string(),
        },
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run every stage and print the export link
  schematize --base-url http://localhost:8000 lei_8112.pdf

  # Keep the whole document as JSON
  schematize lei_8112.pdf -o lei_8112.json

  # Replace the generated schematization before export
  schematize --edits revisado.json lei_8112.pdf

  # Download the source first
  schematize https://www.planalto.gov.br/ccivil_03/leis/l8112cons.pdf

EDITS FILE:
  Either a JSON array or an object with a "schematization" array:
    [{ "title": "Art. 1", "schematization": "..." }, ...]

ENVIRONMENT VARIABLES:
  SCHEMATIZE_API_URL      Base URL of the processing services
  RUST_LOG                Override the log filter (e.g. schematize_pipeline=debug)
"#;

/// Walk a law PDF through extraction, summarization, schematization, editing
/// and export.
#[derive(Parser, Debug)]
#[command(
    name = "schematize",
    version,
    about = "Walk a law PDF through the schematization services and export the result",
    long_about = "Send a law document (local file or URL) through the five processing \
services in order: extraction, summarization, schematization, editing and export. \
Each stage is retried on transient failures; the export link is printed on success.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Base URL of the processing services.
    #[arg(long, env = "SCHEMATIZE_API_URL")]
    base_url: Option<String>,

    /// JSON file with a schematization to submit at the Edit stage.
    #[arg(long, env = "SCHEMATIZE_EDITS")]
    edits: Option<PathBuf>,

    /// Submit the Edit stage without changes.
    #[arg(long, env = "SCHEMATIZE_READ_ONLY")]
    read_only: bool,

    /// Export format requested from the export service.
    #[arg(long, env = "SCHEMATIZE_EXPORT_FORMAT", default_value = "pdf")]
    export_format: String,

    /// Tries per stage, including the first.
    #[arg(long, env = "SCHEMATIZE_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..=10))]
    max_attempts: u32,

    /// Initial delay between retries in milliseconds (doubles each retry).
    #[arg(long, env = "SCHEMATIZE_RETRY_BACKOFF", default_value_t = 500)]
    retry_backoff: u64,

    /// Per-call service timeout in seconds.
    #[arg(long, env = "SCHEMATIZE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "SCHEMATIZE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Write the final document as JSON to this file.
    #[arg(short, long, env = "SCHEMATIZE_OUTPUT")]
    output: Option<PathBuf>,

    /// Print the final document as JSON on stdout.
    #[arg(long, env = "SCHEMATIZE_JSON")]
    json: bool,

    /// Disable progress spinner.
    #[arg(long, env = "SCHEMATIZE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCHEMATIZE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCHEMATIZE_QUIET")]
    quiet: bool,
}

/// Accepted layouts of the `--edits` file.
#[derive(Deserialize)]
#[serde(untagged)]
enum EditsFile {
    List(Vec<SchematizedSection>),
    Wrapped {
        schematization: Vec<SchematizedSection>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers progress; only warnings get through while it runs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build controller ─────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let controller = StepController::new(&config).context("Failed to set up pipeline")?;

    let source = SourceFile::resolve(&cli.input, config.download_timeout_secs)
        .await
        .context("Failed to load source document")?;

    let mut auto = AutoView::new(source)
        .max_attempts(cli.max_attempts)
        .retry_backoff_ms(cli.retry_backoff);
    if let Some(ref path) = cli.edits {
        auto = auto.with_edits(read_edits(path).await?);
    }

    if !cli.quiet {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {}…", cli.input))
        );
    }

    // ── Run pipeline ─────────────────────────────────────────────────────
    let mut view = CliView::new(auto, show_progress, cli.quiet);
    let outcome = tokio::select! {
        outcome = drive(&controller, &mut view) => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    view.finish();
    let Some(outcome) = outcome else {
        controller.reset();
        anyhow::bail!("Interrupted");
    };
    let document = outcome.context("Pipeline stopped")?;

    // ── Output ───────────────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        save_document(&document, output_path)
            .await
            .context("Failed to write output")?;
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&document).context("Failed to serialise output")?;
        println!("{json}");
    } else if let Some(url) = document.export_ref.as_ref().and_then(|r| r.file_url.as_deref()) {
        println!("{url}");
    }

    if !cli.quiet {
        let target = cli
            .output
            .as_ref()
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default();
        eprintln!(
            "{} {} sections, {} schematized{}",
            green("✔"),
            bold(&document.structure.len().to_string()),
            document.schematization.len(),
            target,
        );
        if document.export_ref.as_ref().and_then(|r| r.file_url.as_ref()).is_none() {
            eprintln!("   {}", dim("export service returned no file link"));
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .export_format(cli.export_format.clone())
        .editable(!cli.read_only)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.clone());
    }

    builder.build().context("Invalid configuration")
}

/// Load the `--edits` file.
async fn read_edits(path: &Path) -> Result<Vec<SchematizedSection>> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read edits from {:?}", path))?;
    let edits: EditsFile = serde_json::from_slice(&raw)
        .with_context(|| format!("Invalid edits file {:?}", path))?;
    Ok(match edits {
        EditsFile::List(sections) | EditsFile::Wrapped { schematization: sections } => sections,
    })
}
