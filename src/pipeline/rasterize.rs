//! Document decoding and page-1 rasterisation.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto a dedicated
//! thread pool thread designed for blocking operations, preventing the
//! Tokio worker threads from stalling during CPU-heavy rendering.
//!
//! ## Why write the raster to disk?
//!
//! The rendered PNG is handed to the extraction stage through a file in the
//! run's private temp directory rather than a shared in-memory buffer. The
//! filename embeds the document role, each run gets its own directory, and
//! the orchestrator removes the file as soon as extraction for it completes
//! — with the `TempDir` drop as the unconditional backstop.

use crate::error::GradeError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which of the two grading inputs a document is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentRole {
    /// The teacher's answer key.
    AnswerKey,
    /// The student's submitted sheet.
    StudentSheet,
}

impl DocumentRole {
    /// Stable label used in filenames, logs, and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentRole::AnswerKey => "answer-key",
            DocumentRole::StudentSheet => "student-sheet",
        }
    }
}

impl std::fmt::Display for DocumentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A raw document awaiting rasterisation. Only page 1 is ever processed.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub bytes: Vec<u8>,
    pub role: DocumentRole,
}

impl DocumentInput {
    /// Wrap already-decoded document bytes, verifying the PDF header.
    pub fn new(bytes: Vec<u8>, role: DocumentRole) -> Result<Self, GradeError> {
        if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
            return Err(GradeError::DocumentFormat {
                role: role.label(),
                detail: format!(
                    "missing %PDF header (first bytes: {:?})",
                    &bytes[..bytes.len().min(4)]
                ),
            });
        }
        Ok(Self { bytes, role })
    }

    /// Decode a base64-encoded document, as received on the wire.
    ///
    /// Interior whitespace is stripped first: MIME-style senders wrap the
    /// payload at 76 columns, and those documents must decode the same as
    /// unwrapped ones.
    pub fn from_base64(encoded: &str, role: DocumentRole) -> Result<Self, GradeError> {
        let compact: String = encoded
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|e| GradeError::DocumentFormat {
                role: role.label(),
                detail: format!("invalid base64: {e}"),
            })?;
        Self::new(bytes, role)
    }
}

/// A rendered page-1 raster, written into the run's temp directory.
///
/// Exclusively owned by one grading run; the orchestrator deletes the file
/// once extraction for it completes.
#[derive(Debug)]
pub struct RasterImage {
    pub path: PathBuf,
    pub role: DocumentRole,
}

/// The document-rasterisation capability.
///
/// `workdir` is the run's private temp directory; implementations must
/// write intermediate artifacts only there so the run's scoped cleanup can
/// guarantee removal on every exit path.
#[async_trait]
pub trait DocumentRasterizer: Send + Sync {
    async fn rasterize(
        &self,
        document: &DocumentInput,
        workdir: &Path,
    ) -> Result<RasterImage, GradeError>;
}

/// pdfium-backed rasterizer: renders page 1 to a PNG capped at
/// `max_pixels` on the longest edge.
pub struct PdfiumRasterizer {
    max_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn new(max_pixels: u32) -> Self {
        Self { max_pixels }
    }
}

#[async_trait]
impl DocumentRasterizer for PdfiumRasterizer {
    async fn rasterize(
        &self,
        document: &DocumentInput,
        workdir: &Path,
    ) -> Result<RasterImage, GradeError> {
        let bytes = document.bytes.clone();
        let role = document.role;
        let max_pixels = self.max_pixels;
        let out_path = workdir.join(format!("{}-page1.png", role.label()));
        let path = out_path.clone();

        tokio::task::spawn_blocking(move || {
            let img = render_first_page(&bytes, role, max_pixels)?;
            img.save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| GradeError::Rasterization {
                    role: role.label(),
                    detail: format!("PNG write failed: {e}"),
                })?;
            debug!(
                "rendered {} page 1 -> {} ({}x{} px)",
                role,
                path.display(),
                img.width(),
                img.height()
            );
            Ok(())
        })
        .await
        .map_err(|e| GradeError::Internal(format!("render task panicked: {e}")))??;

        Ok(RasterImage {
            path: out_path,
            role,
        })
    }
}

/// Blocking pdfium work: load the document from memory and render page 1.
fn render_first_page(
    bytes: &[u8],
    role: DocumentRole,
    max_pixels: u32,
) -> Result<DynamicImage, GradeError> {
    let pdfium = Pdfium::default();

    let document =
        pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| GradeError::DocumentFormat {
                role: role.label(),
                detail: format!("{e:?}"),
            })?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err(GradeError::DocumentFormat {
            role: role.label(),
            detail: "document has no pages".into(),
        });
    }

    let page = pages.get(0).map_err(|e| GradeError::Rasterization {
        role: role.label(),
        detail: format!("{e:?}"),
    })?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| GradeError::Rasterization {
            role: role.label(),
            detail: format!("{e:?}"),
        })?;

    Ok(bitmap.as_image())
}
