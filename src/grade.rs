//! The grading orchestrator.
//!
//! Sequences the pipeline stages for one run:
//!
//! ```text
//! received ─▶ rasterizing ─▶ extracting ─┐
//! received ─▶ rasterizing ─▶ extracting ─┴▶ prompting ─▶ completing ─▶ validating ─▶ done
//! ```
//!
//! The two documents' rasterize+extract legs are independent and run
//! concurrently via `futures::try_join!`; the first error cancels the
//! sibling leg and short-circuits the run. Every run owns a private
//! [`tempfile::TempDir`] for its raster artifacts: each PNG is removed as
//! soon as its extraction finishes, and the directory's `Drop` removes
//! whatever is left on every other path — error, panic, or caller
//! cancellation. Nothing is shared between concurrent runs.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from hosted model APIs are transient and frequent
//! under load. Transient extraction and completion failures are retried up
//! to `max_retries` times with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`); format and content errors are
//! never retried. An empty completion is a content error
//! ([`GradeError::CompletionEmpty`]) unless `retry_empty_completion` says
//! to treat it as transient, and an invalid report can be re-prompted
//! exactly once via `reprompt_on_invalid_report`.

use crate::config::GradingConfig;
use crate::error::GradeError;
use crate::pipeline::complete::{CompletionModel, LlmCompleter};
use crate::pipeline::extract::{ExtractedText, TextExtractor, VisionExtractor};
use crate::pipeline::prompt::build_prompt;
use crate::pipeline::rasterize::{
    DocumentInput, DocumentRasterizer, DocumentRole, PdfiumRasterizer,
};
use crate::pipeline::report::{lenient_report, parse_report, GradingReport};
use crate::progress::Stage;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// Grade a student sheet against an answer key, both supplied as
/// base64-encoded PDF bytes — the shape the `gradeSheet` RPC receives.
///
/// Only page 1 of each document is processed.
///
/// # Errors
/// Fails with the first error encountered, tagged with the stage
/// ([`GradeError::stage`]) and the original cause. No partial report is
/// ever returned, and no temporary artifact survives the call.
pub async fn grade_sheet(
    answer_key_b64: &str,
    student_sheet_b64: &str,
    config: &GradingConfig,
) -> Result<GradingReport, GradeError> {
    let answer_key = DocumentInput::from_base64(answer_key_b64, DocumentRole::AnswerKey)?;
    let student_sheet = DocumentInput::from_base64(student_sheet_b64, DocumentRole::StudentSheet)?;
    grade_documents(answer_key, student_sheet, config).await
}

/// Grade already-decoded documents. Bytes-level entry point used by the CLI.
pub async fn grade_documents(
    answer_key: DocumentInput,
    student_sheet: DocumentInput,
    config: &GradingConfig,
) -> Result<GradingReport, GradeError> {
    let total_start = Instant::now();
    stage_event(config, Stage::Received, None, true);

    // ── Collaborators ────────────────────────────────────────────────────
    let rasterizer = resolve_rasterizer(config);
    let extractor = resolve_extractor(config)?;
    let completer = resolve_completer(config)?;

    // ── Run-scoped temp resources ────────────────────────────────────────
    // Dropped on every exit path, removing any raster left behind.
    let workdir = tempfile::TempDir::new()
        .map_err(|e| GradeError::Internal(format!("failed to create run temp dir: {e}")))?;
    stage_event(config, Stage::Received, None, false);

    // ── Fan-out: rasterize + extract both documents concurrently ─────────
    let ocr_start = Instant::now();
    let (key_text, student_text) = futures::try_join!(
        process_document(&answer_key, workdir.path(), &*rasterizer, &*extractor, config),
        process_document(&student_sheet, workdir.path(), &*rasterizer, &*extractor, config),
    )?;
    info!(
        "extracted both documents in {}ms ({} + {} chars)",
        ocr_start.elapsed().as_millis(),
        key_text.text.len(),
        student_text.text.len()
    );

    // ── Prompt ───────────────────────────────────────────────────────────
    stage_event(config, Stage::Prompting, None, true);
    let prompt = build_prompt(&key_text, &student_text);
    stage_event(config, Stage::Prompting, None, false);

    // ── Completion (with bounded retries) ────────────────────────────────
    stage_event(config, Stage::Completing, None, true);
    let llm_start = Instant::now();
    let raw = complete_with_retries(&*completer, &prompt, config).await?;
    info!("grading completion in {}ms", llm_start.elapsed().as_millis());
    stage_event(config, Stage::Completing, None, false);

    // ── Validation ───────────────────────────────────────────────────────
    stage_event(config, Stage::Validating, None, true);
    let report = if config.validate_report {
        match parse_report(&raw) {
            Ok(report) => report,
            Err(first_err) if config.reprompt_on_invalid_report => {
                warn!("report failed validation, re-prompting once: {first_err}");
                let raw = complete_with_retries(&*completer, &prompt, config).await?;
                parse_report(&raw)?
            }
            Err(e) => return Err(e),
        }
    } else {
        lenient_report(&raw)
    };
    stage_event(config, Stage::Validating, None, false);

    info!(
        "graded {} questions in {}ms total",
        report.questions.len(),
        total_start.elapsed().as_millis()
    );
    stage_event(config, Stage::Done, None, false);
    Ok(report)
}

/// One document's leg of the fan-out: rasterize page 1, extract text,
/// delete the raster.
///
/// The raster file is removed as soon as extraction returns — success or
/// failure — so a run never holds both PNGs longer than needed; the run's
/// `TempDir` covers the paths where this future is dropped early (sibling
/// leg failed, caller cancelled).
async fn process_document(
    document: &DocumentInput,
    workdir: &Path,
    rasterizer: &dyn DocumentRasterizer,
    extractor: &dyn TextExtractor,
    config: &GradingConfig,
) -> Result<ExtractedText, GradeError> {
    let role = document.role;

    stage_event(config, Stage::Rasterizing, Some(role.label()), true);
    let raster = rasterizer.rasterize(document, workdir).await?;
    stage_event(config, Stage::Rasterizing, Some(role.label()), false);

    stage_event(config, Stage::Extracting, Some(role.label()), true);
    let raster_ref = &raster;
    let result = with_retries(config, Stage::Extracting, move || {
        extractor.extract_text(raster_ref)
    })
    .await;

    // Raster handoff is complete either way.
    if let Err(e) = tokio::fs::remove_file(&raster.path).await {
        warn!("failed to remove raster {}: {e}", raster.path.display());
    }

    let text = result?;
    stage_event(config, Stage::Extracting, Some(role.label()), false);
    if text.is_empty() {
        info!("{role}: no text detected (valid, grading an empty transcript)");
    }
    Ok(text)
}

/// Drive the completion call through the retry policy and reject empty
/// output.
async fn complete_with_retries(
    completer: &dyn CompletionModel,
    prompt: &crate::pipeline::prompt::GradingPrompt,
    config: &GradingConfig,
) -> Result<String, GradeError> {
    with_retries(config, Stage::Completing, move || async move {
        let text = completer.complete(prompt).await?;
        if text.trim().is_empty() {
            return Err(GradeError::CompletionEmpty);
        }
        Ok(text)
    })
    .await
}

/// Bounded exponential-backoff retry loop for external-service calls.
///
/// Retries only errors the taxonomy marks transient — plus
/// [`GradeError::CompletionEmpty`] when configured. Everything else
/// returns immediately.
async fn with_retries<T, F, Fut>(
    config: &GradingConfig,
    stage: Stage,
    op: F,
) -> Result<T, GradeError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, GradeError>>,
{
    let mut last_err: Option<GradeError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "{stage}: retry {attempt}/{} after {backoff}ms",
                config.max_retries
            );
            if let Some(ref progress) = config.progress {
                progress.on_retry(stage, attempt, config.max_retries, backoff);
            }
            sleep(Duration::from_millis(backoff)).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let transient = e.is_retryable()
                    || (matches!(e, GradeError::CompletionEmpty) && config.retry_empty_completion);
                if !transient {
                    return Err(e);
                }
                warn!("{stage}: attempt {} failed — {e}", attempt + 1);
                last_err = Some(e);
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| GradeError::Internal("retry loop exited without an error".into())))
}

fn stage_event(config: &GradingConfig, stage: Stage, detail: Option<&str>, start: bool) {
    if let Some(ref progress) = config.progress {
        if start {
            progress.on_stage_start(stage, detail);
        } else {
            progress.on_stage_complete(stage, detail);
        }
    }
}

// ── Collaborator resolution ──────────────────────────────────────────────

fn resolve_rasterizer(config: &GradingConfig) -> Arc<dyn DocumentRasterizer> {
    config
        .rasterizer
        .clone()
        .unwrap_or_else(|| Arc::new(PdfiumRasterizer::new(config.max_rendered_pixels)))
}

fn resolve_extractor(config: &GradingConfig) -> Result<Arc<dyn TextExtractor>, GradeError> {
    if let Some(ref extractor) = config.extractor {
        return Ok(Arc::clone(extractor));
    }
    // Extraction needs a vision-capable model; nano-tier models misread
    // handwriting, so the default is one tier up from the grading model.
    let provider = resolve_provider(config, config.extraction_model.as_deref(), "gpt-4.1-mini")?;
    Ok(Arc::new(VisionExtractor::new(provider, config.max_tokens)))
}

fn resolve_completer(config: &GradingConfig) -> Result<Arc<dyn CompletionModel>, GradeError> {
    if let Some(ref completer) = config.completer {
        return Ok(Arc::clone(completer));
    }
    let provider = resolve_provider(config, config.completion_model.as_deref(), "gpt-4.1-nano")?;
    Ok(Arc::new(LlmCompleter::new(
        provider,
        config.temperature,
        config.max_tokens,
    )))
}

/// Instantiate a named provider with the given model.
fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, GradeError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        GradeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve an LLM provider, from most-specific to least-specific.
///
/// 1. **Named provider** (`config.provider_name`) plus the per-role model —
///    the factory reads the matching API key (`OPENAI_API_KEY`, …) from the
///    environment.
/// 2. **Environment pair** (`SHEETGRADER_LLM_PROVIDER` + `SHEETGRADER_MODEL`)
///    — a provider and model chosen at the execution-environment level
///    (Makefile, shell script, CI). Checked before full auto-detection so
///    the choice is honoured even when several API keys are present.
/// 3. **OpenAI preference** — when `OPENAI_API_KEY` is set, use OpenAI with
///    the per-role model, so multi-key environments behave predictably.
/// 4. **Full auto-detection** (`ProviderFactory::from_env`) — scan all known
///    API key variables and pick the first available provider.
fn resolve_provider(
    config: &GradingConfig,
    role_model: Option<&str>,
    default_model: &str,
) -> Result<Arc<dyn LLMProvider>, GradeError> {
    let model = role_model.unwrap_or(default_model);

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("SHEETGRADER_LLM_PROVIDER"),
        std::env::var("SHEETGRADER_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, role_model.unwrap_or(&env_model));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| GradeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                 Error: {e}"
            ),
        })?;

    Ok(provider)
}
