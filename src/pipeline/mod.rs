//! Pipeline stages for answer-sheet grading.
//!
//! Each submodule implements exactly one transformation step. Keeping the
//! stages separate makes each independently testable and lets the external
//! capabilities (rasteriser, extractor, completer) be swapped for doubles
//! without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//!          ┌─ rasterize ─▶ extract ─┐   (answer key)
//! input ──▶┤                        ├─▶ prompt ─▶ complete ─▶ report
//!          └─ rasterize ─▶ extract ─┘   (student sheet)
//! ```
//!
//! 1. [`input`]     — CLI-side: canonicalise a path or URL to document bytes
//! 2. [`rasterize`] — render page 1 to a PNG in the run's temp dir; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`extract`]   — read the raster with a vision model; empty text is a
//!    valid result
//! 4. [`prompt`]    — pure composition of the two texts into one grading
//!    request with collision-free delimiters
//! 5. [`complete`]  — single-shot language-model call; retry policy lives
//!    in the orchestrator
//! 6. [`report`]    — normalise and validate the per-question block
//!    structure
//!
//! The two rasterize+extract legs have no ordering dependency and run
//! concurrently; both must finish before the prompt is built.

pub mod complete;
pub mod extract;
pub mod input;
pub mod prompt;
pub mod rasterize;
pub mod report;
