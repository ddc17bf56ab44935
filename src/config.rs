//! Configuration for grading runs.
//!
//! All behaviour is controlled through [`GradingConfig`], built via its
//! [`GradingConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across runs and to diff two runs to understand
//! why their reports differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on the
//! documented defaults for the rest.
//!
//! The three external capabilities (rasteriser, extractor, completer) can
//! be injected here as pre-built collaborators — primarily for tests, but
//! also for callers that need middleware such as caching or rate-limiting.
//! When absent, the orchestrator resolves providers from names and the
//! environment (see [`crate::grade`]).

use crate::error::GradeError;
use crate::pipeline::complete::CompletionModel;
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::rasterize::DocumentRasterizer;
use crate::progress::ProgressHandle;
use std::fmt;
use std::sync::Arc;

/// Configuration for a grading run.
///
/// Built via [`GradingConfig::builder()`] or [`GradingConfig::default()`].
///
/// # Example
/// ```rust
/// use sheetgrader::GradingConfig;
///
/// let config = GradingConfig::builder()
///     .completion_model("gpt-4.1-nano")
///     .max_retries(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct GradingConfig {
    /// Maximum rendered raster dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps either dimension regardless of page size, so pdfium never
    /// allocates more than roughly `max_rendered_pixels²` bytes of pixels,
    /// and the PNG stays in the image-size sweet spot for vision models.
    pub max_rendered_pixels: u32,

    /// Sampling temperature for the grading completion. Default: 0.1.
    ///
    /// Low temperature keeps scoring consistent across runs with identical
    /// inputs. The extraction call always uses temperature 0.
    pub temperature: f32,

    /// Maximum tokens per model call (extraction and completion). Default: 4096.
    pub max_tokens: usize,

    /// Maximum retry attempts for a transient external-service failure. Default: 3.
    ///
    /// Applies to extraction and completion calls only; format and content
    /// errors are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s. Backing off avoids
    /// hammering a rate-limited backend from concurrent runs.
    pub retry_backoff_ms: u64,

    /// Treat an empty completion as transient and retry it. Default: false.
    ///
    /// An empty response is normally a content failure
    /// ([`GradeError::CompletionEmpty`]), not an outage.
    pub retry_empty_completion: bool,

    /// Re-prompt once when the report fails validation. Default: false.
    pub reprompt_on_invalid_report: bool,

    /// Validate the completion against the report structure. Default: true.
    ///
    /// Disabling restores the historical pass-through behaviour: the
    /// normalised completion is returned as-is and never fails with
    /// [`GradeError::ReportFormat`].
    pub validate_report: bool,

    /// Model used for vision text extraction, e.g. "gpt-4.1-mini".
    /// If None, uses the provider default.
    pub extraction_model: Option<String>,

    /// Model used for the grading completion, e.g. "gpt-4.1-nano".
    /// If None, uses the provider default.
    pub completion_model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic") for both roles.
    /// If None along with the injected collaborators, providers are
    /// auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-built rasteriser. Takes precedence over the pdfium default.
    pub rasterizer: Option<Arc<dyn DocumentRasterizer>>,

    /// Pre-built text extractor. Takes precedence over `provider_name`.
    pub extractor: Option<Arc<dyn TextExtractor>>,

    /// Pre-built completion model. Takes precedence over `provider_name`.
    pub completer: Option<Arc<dyn CompletionModel>>,

    /// Stage progress callback. Default: none.
    pub progress: Option<ProgressHandle>,

    /// Download timeout for URL inputs in seconds (CLI). Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 2000,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            retry_empty_completion: false,
            reprompt_on_invalid_report: false,
            validate_report: true,
            extraction_model: None,
            completion_model: None,
            provider_name: None,
            rasterizer: None,
            extractor: None,
            completer: None,
            progress: None,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for GradingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradingConfig")
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("retry_empty_completion", &self.retry_empty_completion)
            .field("reprompt_on_invalid_report", &self.reprompt_on_invalid_report)
            .field("validate_report", &self.validate_report)
            .field("extraction_model", &self.extraction_model)
            .field("completion_model", &self.completion_model)
            .field("provider_name", &self.provider_name)
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn DocumentRasterizer>"))
            .field("extractor", &self.extractor.as_ref().map(|_| "<dyn TextExtractor>"))
            .field("completer", &self.completer.as_ref().map(|_| "<dyn CompletionModel>"))
            .finish()
    }
}

impl GradingConfig {
    /// Create a new builder for `GradingConfig`.
    pub fn builder() -> GradingConfigBuilder {
        GradingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GradingConfig`].
#[derive(Debug)]
pub struct GradingConfigBuilder {
    config: GradingConfig,
}

impl GradingConfigBuilder {
    /// Clamped to `[100, 8192]`; pdfium render dimensions are `i32` and
    /// anything beyond 8k pixels only burns memory without helping OCR.
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.clamp(100, 8192);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn retry_empty_completion(mut self, v: bool) -> Self {
        self.config.retry_empty_completion = v;
        self
    }

    pub fn reprompt_on_invalid_report(mut self, v: bool) -> Self {
        self.config.reprompt_on_invalid_report = v;
        self
    }

    pub fn validate_report(mut self, v: bool) -> Self {
        self.config.validate_report = v;
        self
    }

    pub fn extraction_model(mut self, model: impl Into<String>) -> Self {
        self.config.extraction_model = Some(model.into());
        self
    }

    pub fn completion_model(mut self, model: impl Into<String>) -> Self {
        self.config.completion_model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn rasterizer(mut self, r: Arc<dyn DocumentRasterizer>) -> Self {
        self.config.rasterizer = Some(r);
        self
    }

    pub fn extractor(mut self, e: Arc<dyn TextExtractor>) -> Self {
        self.config.extractor = Some(e);
        self
    }

    pub fn completer(mut self, c: Arc<dyn CompletionModel>) -> Self {
        self.config.completer = Some(c);
        self
    }

    pub fn progress(mut self, p: ProgressHandle) -> Self {
        self.config.progress = Some(p);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GradingConfig, GradeError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(GradeError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.max_rendered_pixels < 100 {
            return Err(GradeError::InvalidConfig(format!(
                "max_rendered_pixels must be ≥ 100, got {}",
                c.max_rendered_pixels
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = GradingConfig::default();
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.retry_backoff_ms, 500);
        assert!(c.validate_report);
        assert!(!c.retry_empty_completion);
        assert!(c.extractor.is_none());
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = GradingConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_clamps_rendered_pixels_to_both_bounds() {
        let c = GradingConfig::builder()
            .max_rendered_pixels(u32::MAX)
            .build()
            .unwrap();
        assert_eq!(c.max_rendered_pixels, 8192);

        let c = GradingConfig::builder().max_rendered_pixels(10).build().unwrap();
        assert_eq!(c.max_rendered_pixels, 100);
    }

    #[test]
    fn builder_rejects_zero_max_tokens() {
        let err = GradingConfig::builder().max_tokens(0).build().unwrap_err();
        assert!(matches!(err, GradeError::InvalidConfig(_)));
    }

    #[test]
    fn debug_hides_collaborators() {
        let c = GradingConfig::default();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("validate_report"));
        assert!(!dbg.contains("LLMProvider"));
    }
}
