//! Text extraction: read a raster image with a vision model.
//!
//! The extraction capability is a trait so the orchestrator can be tested
//! with doubles and so the backend can be swapped (hosted OCR API, local
//! model) without touching pipeline logic. The production implementation
//! sends the PNG as a base64 image attachment to a vision-capable chat
//! model with a transcription-only system prompt.
//!
//! ## Why PNG, and why `detail: "high"`?
//!
//! PNG is lossless — compression artefacts on handwriting confuse vision
//! models. `detail: "high"` instructs GPT-4-class models to use the full
//! image tile budget; without it small handwriting is lost.
//!
//! An empty transcription is a **valid** result, not an error: a blank
//! sheet grades as a blank sheet. Only transport and quota failures are
//! errors here, and retrying them is the orchestrator's job, not this
//! module's.

use crate::error::GradeError;
use crate::pipeline::rasterize::{DocumentRole, RasterImage};
use crate::prompts::EXTRACTION_SYSTEM_PROMPT;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use tracing::debug;

/// Plain text recovered from one document's raster image. May be empty.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub role: DocumentRole,
}

impl ExtractedText {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// The text-extraction capability: raster image in, full text out.
///
/// Implementations perform a single attempt; retry policy lives in the
/// orchestrator.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, image: &RasterImage) -> Result<ExtractedText, GradeError>;
}

/// Vision-model-backed extractor.
pub struct VisionExtractor {
    provider: Arc<dyn LLMProvider>,
    max_tokens: usize,
}

impl VisionExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, max_tokens: usize) -> Self {
        Self {
            provider,
            max_tokens,
        }
    }
}

#[async_trait]
impl TextExtractor for VisionExtractor {
    async fn extract_text(&self, image: &RasterImage) -> Result<ExtractedText, GradeError> {
        let role = image.role;

        let png = tokio::fs::read(&image.path)
            .await
            .map_err(|e| GradeError::Internal(format!("raster read failed: {e}")))?;
        let b64 = STANDARD.encode(&png);
        debug!("encoded {} raster -> {} bytes base64", role, b64.len());

        let image_data = ImageData::new(b64, "image/png").with_detail("high");

        // Vision APIs require at least one user turn; the image carries all
        // the actual content.
        let messages = vec![
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user_with_images("", vec![image_data]),
        ];

        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| GradeError::ExtractionService {
                role: role.label(),
                detail: format!("{e}"),
                retryable: true,
            })?;

        debug!(
            "{}: extracted {} chars ({} in / {} out tokens)",
            role,
            response.content.len(),
            response.prompt_tokens,
            response.completion_tokens
        );

        // No text detected is a valid outcome and must propagate as empty.
        Ok(ExtractedText {
            text: response.content,
            role,
        })
    }
}
