//! CLI binary for blob2md.
//!
//! A thin host over the library crate: maps flags onto `PipelineConfig`,
//! feeds keys or events to the pipeline and reports outcomes.

use anyhow::{Context, Result};
use blob2md::output::{Converted, Failed, Stage};
use blob2md::{
    convert_bytes, dispatch, handle_all, event::event_stream, ExtractionConfig, Extractor,
    Pipeline, PipelineConfig, PipelineObserver, StorageConnection,
};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
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

/// Cut `s` to at most `max` characters, marking the cut.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let mut cut: String = s.chars().take(max - 1).collect();
        cut.push('\u{2026}');
        cut
    } else {
        s.to_string()
    }
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a live bar (or spinner, when the number of events is
/// unknown) plus one log line per finished invocation. Invocations finish
/// out of order, so every line carries its source key.
struct CliObserver {
    bar: ProgressBar,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl CliObserver {
    fn new(total: Option<usize>) -> Arc<Self> {
        let bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total as u64);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.cyan} {prefix:.bold}  \
                         [{bar:42.green/238}] {pos:>3}/{len} objects  \
                         ⏱ {elapsed_precise}  {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏  ")
                    .tick_strings(TICKS),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.cyan} {prefix:.bold}  {pos} handled  {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(TICKS),
                );
                bar
            }
        };
        bar.set_prefix("Converting");
        bar.set_message("waiting for events…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
        let ok = self.succeeded.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} objects converted", green("✔"), bold(&ok.to_string()));
        } else {
            eprintln!(
                "{} {}/{} objects converted  ({} failed)",
                if ok == 0 { red("✘") } else { cyan("⚠") },
                bold(&ok.to_string()),
                ok + failed,
                red(&failed.to_string()),
            );
        }
    }
}

impl PipelineObserver for CliObserver {
    fn on_stage(&self, source: &str, stage: Stage) {
        self.bar
            .set_message(format!("{} {}", truncate(source, 40), dim(stage.as_str())));
    }

    fn on_succeeded(&self, c: &Converted) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {}  →  {}  {}  {}",
            green("✓"),
            c.source,
            bold(&c.output),
            dim(&format!("{} · {} elements · {} bytes", c.format, c.elements, c.bytes)),
            dim(&format!("{:.1}s", c.duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_failed(&self, f: &Failed) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {}  {}  {}",
            red("✗"),
            f.source,
            red(&truncate(&format!("{} while {}: {}", f.kind, f.stage, f.message), 100)),
            dim(&format!("{:.1}s", f.duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert two objects from a local "account" directory
  blob2md --connection ./storage process reports/Q1.pdf slides/kickoff.pptx

  # Serve events from a relay, one JSON event per line
  event-relay | blob2md --connection "$BLOB_URL" listen

  # Separate accounts for sources and Markdown
  blob2md --connection "$IN_URL" --output-connection "$OUT_URL" listen < events.jsonl

  # Convert a local file without any storage
  blob2md convert handbook.docx -o handbook.md

  # Show what the extractor finds in a file
  blob2md inspect scan.png --json

CONNECTIONS:
  ./dir  /abs/dir  file:///abs/dir          Local directory; containers are subdirectories
  https://acct.blob.core.windows.net?sv=…   Blob endpoint with a SAS query
  BlobEndpoint=https://…;SharedAccessSignature=sv=…
                                            Account connection string (SAS only)

EVENT LINES (listen):
  reports/Q1.pdf
  {"key": "reports/Q1.pdf"}
  {"subject": "/blobServices/default/containers/input-files/blobs/reports/Q1.pdf",
   "eventType": "Microsoft.Storage.BlobCreated"}
  {"data": {"url": "https://acct.blob.core.windows.net/input-files/reports/Q1.pdf"}}
  A JSON array of any of the above.

ENVIRONMENT VARIABLES:
  BLOB2MD_CONNECTION        Storage connection for sources (and outputs)
  BLOB2MD_OUTPUT_CONNECTION Storage connection for outputs
  BLOB2MD_INPUT_CONTAINER   Source container (default: input-files)
  BLOB2MD_OUTPUT_CONTAINER  Output container (default: output-files)
  OPENAI_API_KEY            Enables the default vision model for images and scans
  EDGEQUAKE_LLM_PROVIDER    Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL           Override vision model ID
  PDFIUM_LIB_PATH           libpdfium file, or the directory holding it
  RUST_LOG                  Log filter; overrides --verbose / --quiet

Invocation failures are logged and reported but never change the exit status
of `process` or `listen`; configuration errors do.
"#;

/// Convert documents landing in a storage container to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "blob2md",
    version,
    about = "Convert documents landing in a storage container to Markdown",
    long_about = "Extract the text structure of PDF, Office, OpenDocument, HTML, text and image \
documents as they land in an input container and publish each one as Markdown to an output \
container. Images and scanned pages are read by a vision model when one is configured.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Storage connection holding the input (and by default output) container.
    #[arg(long, global = true, env = "BLOB2MD_CONNECTION", hide_env_values = true)]
    connection: Option<String>,

    /// Publish outputs through this connection instead.
    #[arg(long, global = true, env = "BLOB2MD_OUTPUT_CONNECTION", hide_env_values = true)]
    output_connection: Option<String>,

    /// Container sources are read from.
    #[arg(long, global = true, env = "BLOB2MD_INPUT_CONTAINER", default_value = "input-files")]
    input_container: String,

    /// Container Markdown is published to.
    #[arg(long, global = true, env = "BLOB2MD_OUTPUT_CONTAINER", default_value = "output-files")]
    output_container: String,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        global = true,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "Vision model provider for images and scanned pages. Auto-detected from \
          EDGEQUAKE_LLM_PROVIDER or OPENAI_API_KEY if not set."
    )]
    provider: Option<String>,

    /// Vision model ID (default: gpt-4.1-nano).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Never call a vision model; images fail and scanned pages are skipped.
    #[arg(long, global = true, env = "BLOB2MD_NO_VISION")]
    no_vision: bool,

    /// Do not send PDF pages without a text layer to the vision model.
    #[arg(long, global = true, env = "BLOB2MD_NO_OCR")]
    no_ocr: bool,

    /// Path to a text file containing a custom OCR prompt.
    #[arg(long, global = true, env = "BLOB2MD_VISION_PROMPT")]
    vision_prompt: Option<PathBuf>,

    /// Longest edge in pixels of images sent to the vision model.
    #[arg(long, global = true, env = "BLOB2MD_MAX_PIXELS", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(100..=10000))]
    max_pixels: u32,

    /// Retries per vision call.
    #[arg(long, global = true, env = "BLOB2MD_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Max vision output tokens per image.
    #[arg(long, global = true, env = "BLOB2MD_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Per-call vision timeout in seconds.
    #[arg(long, global = true, env = "BLOB2MD_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// libpdfium file, or the directory holding it.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Storage request timeout in seconds.
    #[arg(long, global = true, env = "BLOB2MD_HTTP_TIMEOUT", default_value_t = 120)]
    http_timeout: u64,

    /// Invocations in flight at once.
    #[arg(short, long, global = true, env = "BLOB2MD_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Log line format on stderr.
    #[arg(long, global = true, env = "BLOB2MD_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Disable progress bar.
    #[arg(long, global = true, env = "BLOB2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BLOB2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BLOB2MD_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert the given source keys, one invocation each.
    Process {
        /// Keys within the input container.
        #[arg(required = true)]
        keys: Vec<String>,

        /// Print one JSON outcome per key on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Read storage events from stdin until EOF and convert each new object.
    Listen,
    /// Convert a local file without storage.
    Convert {
        file: PathBuf,

        /// Write Markdown to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the detected format and element kinds of a local file.
    Inspect {
        file: PathBuf,

        /// Output JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces per-invocation INFO lines; warnings still show.
    let show_progress = !cli.quiet
        && !cli.no_progress
        && cli.log_format == LogFormat::Text
        && matches!(cli.command, Command::Process { json: false, .. } | Command::Listen);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr);
    match cli.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }

    match &cli.command {
        Command::Process { keys, json } => {
            let observer = show_progress.then(|| CliObserver::new(Some(keys.len())));
            let pipeline = build_pipeline(&cli, observer.clone()).await?;

            let outcomes = handle_all(&pipeline, keys, cli.concurrency).await;

            if let Some(observer) = observer {
                observer.finish();
            }
            if *json {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                for outcome in &outcomes {
                    let line =
                        serde_json::to_string(outcome).context("Failed to serialise outcome")?;
                    writeln!(handle, "{line}").context("Failed to write to stdout")?;
                }
            } else if !cli.quiet && !show_progress {
                let ok = outcomes.iter().filter(|o| o.is_success()).count();
                eprintln!("Converted {}/{} objects", ok, outcomes.len());
            }
        }

        Command::Listen => {
            let observer = show_progress.then(|| CliObserver::new(None));
            let pipeline = build_pipeline(&cli, observer.clone()).await?;

            let events = event_stream(BufReader::new(tokio::io::stdin()));
            let summary = dispatch(&pipeline, events, cli.concurrency).await;

            if let Some(observer) = observer {
                observer.finish();
            } else if !cli.quiet {
                eprintln!(
                    "Handled {} events: {} converted, {} failed",
                    summary.total(),
                    summary.succeeded,
                    summary.failed
                );
            }
        }

        Command::Convert { file, output } => {
            let extractor = build_extractor(&cli).await?;
            let (bytes, name) = read_local(file).await?;
            let (format, doc) = convert_bytes(&extractor, bytes, &name)
                .await
                .with_context(|| format!("Conversion of {} failed", file.display()))?;

            if let Some(path) = output {
                tokio::fs::write(path, doc.markdown.as_bytes())
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if !cli.quiet {
                    eprintln!(
                        "{}  {}  {} elements  →  {}",
                        green("✔"),
                        format,
                        doc.element_count,
                        bold(&path.display().to_string()),
                    );
                }
            } else {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                handle
                    .write_all(doc.markdown.as_bytes())
                    .context("Failed to write to stdout")?;
                // Ensure a trailing newline on stdout.
                if !doc.markdown.ends_with('\n') {
                    handle.write_all(b"\n").ok();
                }
            }
        }

        Command::Inspect { file, json } => {
            let extractor = build_extractor(&cli).await?;
            let (bytes, name) = read_local(file).await?;
            let extraction = extractor
                .extract(bytes.into(), &name)
                .await
                .with_context(|| format!("Failed to inspect {}", file.display()))?;

            let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
            for element in &extraction.elements {
                *kinds.entry(element.kind.as_str()).or_default() += 1;
            }

            if *json {
                let report = serde_json::json!({
                    "file": file.display().to_string(),
                    "format": extraction.format,
                    "elements": extraction.elements.len(),
                    "kinds": kinds,
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            } else {
                println!("File:      {}", file.display());
                println!("Format:    {}", extraction.format);
                println!("Elements:  {}", extraction.elements.len());
                for (kind, count) in &kinds {
                    println!("  {kind:<14} {count}");
                }
            }
        }
    }

    Ok(())
}

async fn read_local(path: &Path) -> Result<(Vec<u8>, String)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((bytes, name))
}

/// Map CLI args to `ExtractionConfig`.
async fn build_extraction(cli: &Cli) -> Result<ExtractionConfig> {
    let vision_prompt = if let Some(ref path) = cli.vision_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read vision prompt from {:?}", path))?,
        )
    } else {
        None
    };

    Ok(ExtractionConfig {
        vision_enabled: !cli.no_vision,
        provider_name: cli.provider.clone(),
        model: cli.model.clone(),
        max_retries: cli.max_retries,
        max_tokens: cli.max_tokens,
        vision_timeout_secs: cli.api_timeout,
        vision_prompt,
        ocr_scanned_pages: !cli.no_ocr,
        max_rendered_pixels: cli.max_pixels,
        pdfium_library_path: cli.pdfium_lib_path.clone(),
        ..Default::default()
    })
}

async fn build_extractor(cli: &Cli) -> Result<Extractor> {
    let extraction = build_extraction(cli).await?;
    Extractor::new(&extraction).context("Invalid extraction settings")
}

/// Map CLI args to a ready `Pipeline`.
async fn build_pipeline(cli: &Cli, observer: Option<Arc<CliObserver>>) -> Result<Pipeline> {
    let connection = cli
        .connection
        .as_deref()
        .context("No storage connection: pass --connection or set BLOB2MD_CONNECTION")?;
    let connection = StorageConnection::parse(connection).context("Invalid --connection")?;

    let mut builder = PipelineConfig::builder(connection)
        .input_container(&cli.input_container)
        .output_container(&cli.output_container)
        .extraction(build_extraction(cli).await?)
        .http_timeout_secs(cli.http_timeout);
    if let Some(ref out) = cli.output_connection {
        builder = builder.output_connection(
            StorageConnection::parse(out).context("Invalid --output-connection")?,
        );
    }
    let config = builder.build().context("Invalid configuration")?;

    let pipeline = Pipeline::new(&config).context("Failed to start pipeline")?;
    Ok(match observer {
        Some(observer) => pipeline.with_observer(observer),
        None => pipeline,
    })
}
