//! CLI binary for edgequake-docbatch.
//!
//! A thin shim over the library crate: maps CLI flags to `BatchConfig`,
//! feeds files into a `DocumentBatch` and writes the results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_docbatch::{
    BatchConfig, BatchProgressCallback, Category, DirectorySink, DocumentBatch, DocumentExtractor,
    DueDateProcessor, ItemId, ItemProcessor, ItemState, PaymentCodeExtractor,
    PaymentCodeProcessor, PdfTools, PdfiumTools, ProgressCallback, RenameProcessor,
    RqrrDecoder, SourceFile, Unlocker, VisionExtractor, VisionReader,
};
use futures::future;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the whole batch plus a log line per finished document.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<ItemId, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Reading");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self, id: ItemId) -> String {
        let ms = self
            .start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_item_start(&self, id: ItemId, name: &str) {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Instant::now());
        self.bar.set_prefix("Reading");
        self.bar.set_message(name.to_string());
    }

    fn on_item_complete(&self, id: ItemId, name: &str) {
        self.bar
            .println(format!("  {} {:<40}  {}", green("✓"), name, self.elapsed(id)));
        self.bar.inc(1);
    }

    fn on_item_error(&self, id: ItemId, name: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            name,
            red(&msg),
            self.elapsed(id)
        ));
        self.bar.inc(1);
    }

    fn on_password_required(&self, id: ItemId, name: &str) {
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            yellow("🔒"),
            name,
            yellow("password required"),
            self.elapsed(id)
        ));
    }

    fn on_cooldown(&self, delay: Duration) {
        self.bar.set_prefix("Cooling down");
        self.bar.println(format!(
            "  {} provider quota reached; pausing {}s",
            yellow("⏸"),
            delay.as_secs()
        ));
    }

    fn on_ready(&self) {
        self.bar.set_prefix("Reading");
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Rename receipts into ./renamed
  docbatch rename --category comprovante scans/*.pdf -o renamed

  # Invoices, unlocking protected PDFs with one password
  docbatch --password 1234 rename --category nf nf/*.pdf -o renamed

  # Split a multi-page boleto PDF into one file per due date
  docbatch split boletos.pdf -o boletos

  # Bar line and Pix code of each boleto, as JSON
  docbatch codes --json boleto1.pdf boleto2.png

CATEGORIES:
  comprovante   payment receipt
  boleto        bank slip
  nf            invoice (nota fiscal)
  <other>       any other label, used verbatim in the file name

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  DOCBATCH_*              Every flag below, e.g. DOCBATCH_PACING=2
"#;

/// Rename, split and read Brazilian financial documents with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "docbatch",
    version,
    about = "Rename, split and read Brazilian financial documents with Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// LLM model ID (e.g. gpt-4.1-nano, gemini-2.0-flash).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Seconds between two model calls.
    #[arg(long, global = true, env = "DOCBATCH_PACING", default_value_t = 4.0)]
    pacing: f64,

    /// Seconds to pause after a quota error.
    #[arg(long, global = true, env = "DOCBATCH_COOLDOWN", default_value_t = 15.0)]
    cooldown: f64,

    /// Password tried on every protected file.
    #[arg(long, global = true, env = "DOCBATCH_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, global = true, env = "DOCBATCH_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Pages of each PDF sent to the model.
    #[arg(long, global = true, env = "DOCBATCH_MAX_PAGES", default_value_t = 2)]
    max_pages: usize,

    /// Max LLM output tokens per document.
    #[arg(long, global = true, env = "DOCBATCH_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "DOCBATCH_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per document on non-quota LLM failures.
    #[arg(long, global = true, env = "DOCBATCH_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, global = true, env = "DOCBATCH_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, global = true, env = "DOCBATCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCBATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCBATCH_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy documents into a folder under names built from their content.
    Rename {
        /// Document type: comprovante, boleto, nf or any custom label.
        #[arg(short, long, env = "DOCBATCH_CATEGORY", default_value = "comprovante")]
        category: Category,

        /// Output folder.
        #[arg(short, long, env = "DOCBATCH_OUTPUT", default_value = "renamed")]
        output: PathBuf,

        /// PDF or image files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Split a PDF into single pages named after their due dates.
    Split {
        /// Output folder.
        #[arg(short, long, env = "DOCBATCH_OUTPUT", default_value = "split")]
        output: PathBuf,

        /// The PDF to split.
        file: PathBuf,
    },

    /// Read the bar line and Pix payload of boletos.
    Codes {
        /// Print JSON instead of a table.
        #[arg(long, env = "DOCBATCH_JSON")]
        json: bool,

        /// PDF or image files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let common = &cli.common;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless verbose output is asked for.
    let json = matches!(cli.command, Command::Codes { json: true, .. });
    let show_progress = !common.quiet && !common.no_progress && !json;
    let filter = if common.verbose {
        "debug"
    } else if common.quiet || show_progress {
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

    let config = build_config(common).await?;
    let pdf = Arc::new(PdfiumTools::new());
    let reader = Arc::new(
        VisionReader::from_config(pdf.clone(), config.clone())
            .context("No vision provider available")?,
    );
    let extractor: Arc<dyn DocumentExtractor> = Arc::new(
        VisionExtractor::new(reader.clone()).with_system_prompt(config.system_prompt.clone()),
    );

    match &cli.command {
        Command::Rename {
            category,
            output,
            files,
        } => {
            let files = read_files(files).await?;
            let progress = progress_for(show_progress, files.len());
            let batch = new_batch(RenameProcessor::new(extractor), pdf, &config, &progress);
            batch.add_files(files, category.clone());
            drive(&batch, common.password.as_deref()).await?;
            finish(&progress);
            let saved = batch
                .download_all(&DirectorySink::new(output))
                .await
                .context("Failed to write renamed files")?;
            report(&batch, saved, output, common.quiet)
        }
        Command::Split { output, file } => {
            let mut source = SourceFile::read(file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            if pdf.is_encrypted(&source).await? {
                let password = common
                    .password
                    .as_deref()
                    .context("PDF is password protected; pass --password")?;
                source = pdf
                    .unlock(&source, password)
                    .await
                    .context("Could not unlock PDF")?;
            }
            let pages = pdf.split_pages(&source).await.context("Failed to split PDF")?;
            let progress = progress_for(show_progress, pages.len());
            let batch = new_batch(DueDateProcessor::new(extractor), pdf, &config, &progress);
            batch.add_files(pages, Category::BankSlip);
            drive(&batch, None).await?;
            finish(&progress);
            let saved = batch
                .download_all(&DirectorySink::new(output))
                .await
                .context("Failed to write pages")?;
            report(&batch, saved, output, common.quiet)
        }
        Command::Codes { json, files } => {
            let files = read_files(files).await?;
            let progress = progress_for(show_progress, files.len());
            let source = Arc::new(PaymentCodeExtractor::new(
                pdf.clone(),
                Arc::new(RqrrDecoder),
                reader,
                config.clone(),
            ));
            let batch = new_batch(PaymentCodeProcessor::new(source), pdf, &config, &progress);
            batch.add_files(files, Category::BankSlip);
            drive(&batch, common.password.as_deref()).await?;
            finish(&progress);
            print_codes(&batch, *json)?;
            fail_on_errors(&batch)
        }
    }
}

/// Map CLI args to `BatchConfig`.
async fn build_config(common: &CommonArgs) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .pacing_delay(seconds(common.pacing, "--pacing")?)
        .cooldown(seconds(common.cooldown, "--cooldown")?)
        .max_pages(common.max_pages)
        .max_tokens(common.max_tokens)
        .temperature(common.temperature)
        .max_retries(common.max_retries)
        .api_timeout_secs(common.api_timeout);

    if let Some(ref model) = common.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = common.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = common.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

fn seconds(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{flag} must be a non-negative number of seconds"))
}

async fn read_files(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    future::try_join_all(paths.iter().map(|path| async move {
        SourceFile::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }))
    .await
}

fn progress_for(show: bool, total: usize) -> Option<Arc<CliProgressCallback>> {
    show.then(|| CliProgressCallback::new(total))
}

fn finish(progress: &Option<Arc<CliProgressCallback>>) {
    if let Some(p) = progress {
        p.finish();
    }
}

fn new_batch<P: ItemProcessor>(
    processor: P,
    unlocker: Arc<dyn Unlocker>,
    config: &BatchConfig,
    progress: &Option<Arc<CliProgressCallback>>,
) -> DocumentBatch<P> {
    match progress {
        Some(p) => {
            let callback: ProgressCallback = p.clone();
            DocumentBatch::with_progress(processor, unlocker, config, callback)
        }
        None => DocumentBatch::new(processor, unlocker, config),
    }
}

/// Wait for the queue to drain, unlocking protected files with `password`.
/// Ctrl-C freezes the batch and aborts.
async fn drive<P: ItemProcessor>(batch: &DocumentBatch<P>, password: Option<&str>) -> Result<()> {
    let work = async {
        batch.settle().await;
        if let Some(password) = password {
            let waiting: Vec<ItemId> = batch
                .items()
                .iter()
                .filter(|it| it.state() == ItemState::WaitingPassword)
                .map(|it| it.id())
                .collect();
            for id in waiting {
                batch.unlock(id, password).await;
            }
            batch.settle().await;
        }
    };
    tokio::select! {
        _ = work => Ok(()),
        _ = tokio::signal::ctrl_c() => {
            batch.queue().cancel_all();
            anyhow::bail!("Interrupted");
        }
    }
}

fn report<P: ItemProcessor>(
    batch: &DocumentBatch<P>,
    saved: usize,
    output: &std::path::Path,
    quiet: bool,
) -> Result<()> {
    if !quiet {
        let stats = batch.stats();
        eprintln!(
            "{}  {}/{} documents  →  {}",
            if stats.error == 0 && stats.waiting_password == 0 {
                green("✔")
            } else {
                yellow("⚠")
            },
            saved,
            stats.total(),
            bold(&output.display().to_string()),
        );
        for item in batch.items() {
            match item.state() {
                ItemState::Error => eprintln!(
                    "   {} {}: {}",
                    red("✗"),
                    item.original_name(),
                    item.error_message().unwrap_or("failed")
                ),
                ItemState::WaitingPassword => eprintln!(
                    "   {} {}: {}",
                    yellow("🔒"),
                    item.original_name(),
                    item.error_message().unwrap_or("password required")
                ),
                _ => {}
            }
        }
    }
    fail_on_errors(batch)
}

fn fail_on_errors<P: ItemProcessor>(batch: &DocumentBatch<P>) -> Result<()> {
    let stats = batch.stats();
    if stats.error > 0 {
        anyhow::bail!("{} document(s) failed", stats.error);
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CodesRow {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    bar_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pix_payload: Option<String>,
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn print_codes(batch: &DocumentBatch<PaymentCodeProcessor>, json: bool) -> Result<()> {
    let rows: Vec<CodesRow> = batch
        .items()
        .iter()
        .map(|it| {
            let codes = it.extracted().cloned().unwrap_or_default();
            let error = match it.state() {
                ItemState::Complete => None,
                ItemState::WaitingPassword => Some("password required".to_string()),
                _ => Some(it.error_message().unwrap_or("not processed").to_string()),
            };
            CodesRow {
                file: it.original_name().to_string(),
                bar_line: codes.bar_line,
                pix_payload: codes.pix_payload,
                found: codes.found,
                error,
            }
        })
        .collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("Failed to serialise codes")?
        );
        return Ok(());
    }

    for row in rows {
        println!("{}", bold(&row.file));
        if let Some(e) = row.error {
            println!("  {} {}", red("✗"), e);
            continue;
        }
        if !row.found {
            println!("  {}", dim("no payment code found"));
        }
        if let Some(line) = row.bar_line {
            println!("  bar line  {line}");
        }
        if let Some(pix) = row.pix_payload {
            println!("  pix       {pix}");
        }
    }
    Ok(())
}
