//! CLI binary for sheetgrader.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `GradingConfig`, resolves the two document inputs (paths or URLs), and
//! prints the report.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use sheetgrader::pipeline::input::resolve_document;
use sheetgrader::{
    grade_documents, DocumentRole, GradingConfig, GradingProgress, Stage,
};
use std::path::PathBuf;
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
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── CLI progress: one spinner, message tracks the pipeline stage ─────────────

struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_message("starting…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl GradingProgress for SpinnerProgress {
    fn on_stage_start(&self, stage: Stage, detail: Option<&str>) {
        match detail {
            Some(role) => self.bar.set_message(format!("{stage} {role}…")),
            None => self.bar.set_message(format!("{stage}…")),
        }
    }

    fn on_retry(&self, stage: Stage, attempt: u32, max_retries: u32, backoff_ms: u64) {
        self.bar.set_message(format!(
            "{stage}: retry {attempt}/{max_retries} in {backoff_ms}ms…"
        ));
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

/// Grade a handwritten answer sheet against an answer key.
///
/// Both inputs are PDF documents (local path or HTTP/HTTPS URL); only
/// page 1 of each is processed. Provider credentials come from the
/// environment (OPENAI_API_KEY, ANTHROPIC_API_KEY, …).
#[derive(Parser, Debug)]
#[command(name = "sheetgrader", version, about)]
struct Cli {
    /// The teacher's answer key (path or URL).
    answer_key: String,

    /// The student's answer sheet (path or URL).
    student_sheet: String,

    /// LLM provider for both calls (e.g. "openai", "anthropic").
    #[arg(long, env = "SHEETGRADER_LLM_PROVIDER")]
    provider: Option<String>,

    /// Model for the grading completion.
    #[arg(long, env = "SHEETGRADER_MODEL")]
    model: Option<String>,

    /// Model for vision text extraction.
    #[arg(long)]
    extraction_model: Option<String>,

    /// Maximum retries for transient service failures.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Write the Markdown report to a file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the parsed report as JSON.
    #[arg(long)]
    json: bool,

    /// Return the model output without structural validation.
    #[arg(long)]
    no_validate: bool,

    /// Increase log verbosity (-v: info, -vv: debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut builder = GradingConfig::builder()
        .max_retries(cli.max_retries)
        .validate_report(!cli.no_validate);
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.completion_model(model.clone());
    }
    if let Some(ref model) = cli.extraction_model {
        builder = builder.extraction_model(model.clone());
    }

    let spinner = SpinnerProgress::new();
    let config = builder
        .progress(spinner.clone())
        .build()
        .context("invalid configuration")?;

    let timeout = config.download_timeout_secs;
    let result = async {
        let (answer_key, student_sheet) = tokio::try_join!(
            resolve_document(&cli.answer_key, DocumentRole::AnswerKey, timeout),
            resolve_document(&cli.student_sheet, DocumentRole::StudentSheet, timeout),
        )?;
        grade_documents(answer_key, student_sheet, &config).await
    }
    .await;
    spinner.finish();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {} {}", red("✗"), bold("grading failed at"), e.stage());
            eprintln!("  {e}");
            std::process::exit(if e.is_client_error() { 2 } else { 1 });
        }
    };

    let rendered = if cli.json {
        serde_json::to_string_pretty(&report).context("report serialisation failed")?
    } else {
        report.markdown.clone()
    };

    match cli.output {
        Some(ref path) => {
            write_atomic(path, &rendered).await?;
            eprintln!(
                "{} report written to {}",
                green("✓"),
                bold(&path.display().to_string())
            );
        }
        None => println!("{rendered}"),
    }

    if !report.questions.is_empty() {
        eprintln!(
            "{}",
            dim(&format!(
                "{} questions, total {}/{}",
                report.questions.len(),
                report.total_score(),
                report.max_total()
            ))
        );
    }

    Ok(())
}

/// Atomic write (temp file + rename) to prevent partial report files.
async fn write_atomic(path: &PathBuf, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("renaming to {}", path.display()))?;
    Ok(())
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "sheetgrader=info",
        _ => "sheetgrader=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
