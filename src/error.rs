//! Error types for the sheetgrader library.
//!
//! Every failure mode of the grading pipeline maps to one [`GradeError`]
//! variant, so a transport layer in front of the library can translate the
//! taxonomy mechanically:
//!
//! * input problems (`DocumentFormat`, `FileNotFound`, …) are client
//!   errors — retrying the same request cannot succeed;
//! * external-service problems (`ExtractionService`, `CompletionService`)
//!   are server errors and carry a `retryable` flag set when the failure
//!   looked transient (the orchestrator has already exhausted its own
//!   bounded retries by the time one of these surfaces);
//! * content problems (`CompletionEmpty`, `ReportFormat`) mean the model
//!   answered but the answer is unusable; `ReportFormat` keeps the raw
//!   completion attached for diagnosis.
//!
//! [`GradeError::stage`] names the pipeline stage that failed, so callers
//! are always told where a run stopped, never just that it stopped.

use crate::progress::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the sheetgrader library.
#[derive(Debug, Error)]
pub enum GradeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Document file was not found at the given path (CLI input resolution).
    #[error("document file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The supplied bytes are not a decodable document.
    ///
    /// Covers invalid base64 in the request as well as bytes without a PDF
    /// header. `role` says which of the two documents was bad.
    #[error("{role} document is not a valid PDF: {detail}")]
    DocumentFormat { role: &'static str, detail: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// pdfium failed to render page 1 of a well-formed-looking document.
    #[error("rasterisation failed for the {role} document: {detail}")]
    Rasterization { role: &'static str, detail: String },

    /// The text-extraction backend failed (unreachable, quota, model error).
    #[error("text extraction failed for the {role} document: {detail}")]
    ExtractionService {
        role: &'static str,
        detail: String,
        retryable: bool,
    },

    /// The completion backend failed (unreachable, quota, model error).
    #[error("grading completion failed: {detail}")]
    CompletionService { detail: String, retryable: bool },

    /// The completion backend returned no usable text.
    #[error("grading completion returned an empty response")]
    CompletionEmpty,

    /// The completion text failed structural report validation.
    ///
    /// `raw` is the full completion so the malformed output can be surfaced
    /// for diagnosis instead of silently passed through or discarded.
    #[error("grading report failed validation: {detail}")]
    ReportFormat { detail: String, raw: String },

    // ── Provider / config errors ──────────────────────────────────────────
    /// The configured LLM provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (temp dir creation, task panic, …).
    #[error("internal error: {0}")]
    Internal(String),
}

impl GradeError {
    /// Whether the underlying failure looked transient.
    ///
    /// Only external-service errors can be retryable; everything else is
    /// either a client error or a content error and retrying the identical
    /// request cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        match self {
            GradeError::ExtractionService { retryable, .. }
            | GradeError::CompletionService { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            GradeError::FileNotFound { .. }
            | GradeError::PermissionDenied { .. }
            | GradeError::DownloadFailed { .. }
            | GradeError::DownloadTimeout { .. }
            | GradeError::DocumentFormat { .. } => Stage::Received,
            GradeError::Rasterization { .. } => Stage::Rasterizing,
            GradeError::ExtractionService { .. } => Stage::Extracting,
            GradeError::CompletionService { .. } | GradeError::CompletionEmpty => Stage::Completing,
            GradeError::ReportFormat { .. } => Stage::Validating,
            GradeError::ProviderNotConfigured { .. }
            | GradeError::InvalidConfig(_)
            | GradeError::Internal(_) => Stage::Received,
        }
    }

    /// Whether a transport layer should map this to a client (4xx) error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GradeError::FileNotFound { .. }
                | GradeError::PermissionDenied { .. }
                | GradeError::DocumentFormat { .. }
        )
    }
}
