//! # sheetgrader
//!
//! Grade a handwritten answer sheet against a teacher's answer key using
//! vision-model OCR and a language model.
//!
//! ## Why this crate?
//!
//! Hand-grading stacks of answer sheets is slow and inconsistent.
//! sheetgrader rasterises page 1 of both documents, lets a vision model
//! read each page as a human would, and asks a language model to compare
//! the student's answers to the key semantically — not by keyword match —
//! producing a per-question Markdown report with a score out of 10 and a
//! feedback sentence for each question.
//!
//! ## Pipeline Overview
//!
//! ```text
//! answer-key PDF ──▶ rasterize ──▶ extract ──┐
//!                    (pdfium)     (vision)   ├─▶ prompt ─▶ complete ─▶ report
//! student PDF ─────▶ rasterize ──▶ extract ──┘   (pure)     (LLM)    (validate)
//! ```
//!
//! The per-document legs run concurrently; every run owns a private temp
//! directory that is cleaned up on success, error, and cancellation alike.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sheetgrader::{grade_sheet, GradingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = GradingConfig::default();
//!     let key_b64 = std::fs::read_to_string("answer_key.pdf.b64")?;
//!     let sheet_b64 = std::fs::read_to_string("student_sheet.pdf.b64")?;
//!     let report = grade_sheet(&key_b64, &sheet_b64, &config).await?;
//!     println!("{}", report.markdown);
//!     eprintln!("total: {}/{}", report.total_score(), report.max_total());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `sheetgrader` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! sheetgrader = { version = "0.2", default-features = false }
//! ```
//!
//! ## Testing without live services
//!
//! The three external capabilities are traits
//! ([`DocumentRasterizer`](pipeline::rasterize::DocumentRasterizer),
//! [`TextExtractor`](pipeline::extract::TextExtractor),
//! [`CompletionModel`](pipeline::complete::CompletionModel)) injected via
//! [`GradingConfig`]; supply doubles and the whole pipeline runs with no
//! network and no pdfium.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod grade;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GradingConfig, GradingConfigBuilder};
pub use error::GradeError;
pub use grade::{grade_documents, grade_sheet};
pub use pipeline::complete::CompletionModel;
pub use pipeline::extract::{ExtractedText, TextExtractor};
pub use pipeline::prompt::{build_prompt, GradingPrompt};
pub use pipeline::rasterize::{DocumentInput, DocumentRasterizer, DocumentRole, RasterImage};
pub use pipeline::report::{parse_report, GradingReport, QuestionGrade, MAX_SCORE};
pub use progress::{GradingProgress, NoopProgress, ProgressHandle, Stage};
