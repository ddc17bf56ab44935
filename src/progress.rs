//! Grading stages and the progress-callback trait.
//!
//! A grading run moves through a fixed sequence of stages; [`Stage`] names
//! them and [`GradingProgress`] lets callers observe the transitions.
//! Inject an `Arc<dyn GradingProgress>` via
//! [`crate::config::GradingConfigBuilder::progress`] to receive real-time
//! events — a CLI spinner, a WebSocket forwarder, a log record — without
//! the library knowing anything about how the host application
//! communicates.
//!
//! The two documents' rasterize+extract legs run concurrently, so
//! `on_stage_start(Stage::Extracting)` for one document may arrive while
//! the other is still rasterising. Implementations must be `Send + Sync`
//! and protect any shared mutable state.

use std::fmt;
use std::sync::Arc;

/// The stages a grading run moves through, in order.
///
/// A run that fails stops at the stage reported by
/// [`crate::error::GradeError::stage`]; a run that succeeds passes through
/// every stage and ends at [`Stage::Done`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Request received; inputs decoded and checked.
    Received,
    /// Rendering page 1 of a document to a raster image.
    Rasterizing,
    /// Extracting text from a raster image.
    Extracting,
    /// Composing the grading prompt from the two extracted texts.
    Prompting,
    /// Waiting on the completion backend.
    Completing,
    /// Validating the completion against the report structure.
    Validating,
    /// Report produced.
    Done,
}

impl Stage {
    /// Stable lowercase label used in logs and progress messages.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Rasterizing => "rasterizing",
            Stage::Extracting => "extracting",
            Stage::Prompting => "prompting",
            Stage::Completing => "completing",
            Stage::Validating => "validating",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the orchestrator as a run moves between stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait GradingProgress: Send + Sync {
    /// Called when a stage begins. `detail` carries the document role for
    /// the per-document stages (`rasterizing`, `extracting`), `None`
    /// otherwise.
    fn on_stage_start(&self, stage: Stage, detail: Option<&str>) {
        let _ = (stage, detail);
    }

    /// Called when a stage completes successfully.
    fn on_stage_complete(&self, stage: Stage, detail: Option<&str>) {
        let _ = (stage, detail);
    }

    /// Called before a retry of an external-service call.
    fn on_retry(&self, stage: Stage, attempt: u32, max_retries: u32, backoff_ms: u64) {
        let _ = (stage, attempt, max_retries, backoff_ms);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl GradingProgress for NoopProgress {}

/// Convenience alias matching the type stored in [`crate::config::GradingConfig`].
pub type ProgressHandle = Arc<dyn GradingProgress>;
