//! Completion: send the grading prompt to the language model.
//!
//! Deliberately thin. One prompt in, one completion out, single attempt —
//! retry and backoff live in the orchestrator so every implementation of
//! the capability (hosted API, local model, test double) gets the same
//! policy for free. Emptiness of the returned text is also judged by the
//! orchestrator, for the same reason.

use crate::error::GradeError;
use crate::pipeline::prompt::GradingPrompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use tracing::debug;

/// The text-completion capability: prompt in, generated text out.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &GradingPrompt) -> Result<String, GradeError>;
}

/// LLM-provider-backed completer.
pub struct LlmCompleter {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmCompleter {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
        }
    }
}

#[async_trait]
impl CompletionModel for LlmCompleter {
    async fn complete(&self, prompt: &GradingPrompt) -> Result<String, GradeError> {
        let messages = vec![ChatMessage::user(prompt.text.clone())];

        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| GradeError::CompletionService {
                detail: format!("{e}"),
                retryable: true,
            })?;

        debug!(
            "completion: {} chars ({} in / {} out tokens)",
            response.content.len(),
            response.prompt_tokens,
            response.completion_tokens
        );

        Ok(response.content)
    }
}
