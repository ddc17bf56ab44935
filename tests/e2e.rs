//! End-to-end pipeline tests for sheetgrader.
//!
//! All three external capabilities (rasteriser, extractor, completer) are
//! replaced with in-process doubles injected through `GradingConfig`, so
//! the full orchestration — fan-out, retry policy, temp-artifact cleanup,
//! validation — runs with no network, no API keys, and no pdfium library.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sheetgrader::pipeline::complete::CompletionModel;
use sheetgrader::pipeline::extract::{ExtractedText, TextExtractor};
use sheetgrader::pipeline::rasterize::{DocumentInput, DocumentRasterizer, RasterImage};
use sheetgrader::{grade_sheet, DocumentRole, GradeError, GradingConfig, Stage};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Writes a placeholder raster into the run's workdir and records every
/// path it created, so tests can verify cleanup afterwards.
#[derive(Default)]
struct FakeRasterizer {
    rasters: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl DocumentRasterizer for FakeRasterizer {
    async fn rasterize(
        &self,
        document: &DocumentInput,
        workdir: &Path,
    ) -> Result<RasterImage, GradeError> {
        let path = workdir.join(format!("{}-page1.png", document.role.label()));
        tokio::fs::write(&path, b"fake png bytes")
            .await
            .expect("workdir must be writable");
        self.rasters.lock().unwrap().push(path.clone());
        Ok(RasterImage {
            path,
            role: document.role,
        })
    }
}

impl FakeRasterizer {
    fn created_paths(&self) -> Vec<PathBuf> {
        self.rasters.lock().unwrap().clone()
    }
}

/// Returns canned text per role; optionally fails for one role, either
/// permanently or for a bounded number of transient attempts.
struct FakeExtractor {
    key_text: String,
    student_text: String,
    fail_role: Option<DocumentRole>,
    fail_permanently: bool,
    transient_failures: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeExtractor {
    fn new(key_text: &str, student_text: &str) -> Self {
        Self {
            key_text: key_text.to_string(),
            student_text: student_text.to_string(),
            fail_role: None,
            fail_permanently: false,
            transient_failures: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every call for `role` with a non-retryable service error.
    fn failing_for(mut self, role: DocumentRole) -> Self {
        self.fail_role = Some(role);
        self.fail_permanently = true;
        self
    }

    /// Fail the first `n` calls for `role` with a transient service error,
    /// then succeed.
    fn transiently_failing_for(mut self, role: DocumentRole, n: usize) -> Self {
        self.fail_role = Some(role);
        self.transient_failures = AtomicUsize::new(n);
        self
    }
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract_text(&self, image: &RasterImage) -> Result<ExtractedText, GradeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(
            image.path.exists(),
            "raster must still exist while extraction runs"
        );
        if self.fail_role == Some(image.role) {
            if self.fail_permanently {
                return Err(GradeError::ExtractionService {
                    role: image.role.label(),
                    detail: "quota exceeded".into(),
                    retryable: false,
                });
            }
            let remaining = self.transient_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(GradeError::ExtractionService {
                    role: image.role.label(),
                    detail: "HTTP 503".into(),
                    retryable: true,
                });
            }
        }
        let text = match image.role {
            DocumentRole::AnswerKey => self.key_text.clone(),
            DocumentRole::StudentSheet => self.student_text.clone(),
        };
        Ok(ExtractedText {
            text,
            role: image.role,
        })
    }
}

/// Pops scripted responses in order and records every prompt it saw.
struct ScriptedCompleter {
    responses: Mutex<VecDeque<Result<String, GradeError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompleter {
    fn returning(text: &str) -> Self {
        Self::with_responses(vec![Ok(text.to_string())])
    }

    fn with_responses(responses: Vec<Result<String, GradeError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn seen_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedCompleter {
    async fn complete(
        &self,
        prompt: &sheetgrader::GradingPrompt,
    ) -> Result<String, GradeError> {
        self.prompts.lock().unwrap().push(prompt.text.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("completer called more times than scripted")
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const GOOD_REPORT: &str = "### Question 1\n\
**Score:** 8/10\n\
**Feedback:** The main theme is identified, but the secondary motivation is missing.\n\
\n\
### Question 2\n\
**Score:** 10/10\n\
**Feedback:** Excellent. Matches the model answer in full.\n";

fn pdf_b64() -> String {
    STANDARD.encode(b"%PDF-1.7\n1 0 obj\nfake single-page document\n%%EOF")
}

struct Doubles {
    rasterizer: Arc<FakeRasterizer>,
    extractor: Arc<FakeExtractor>,
    completer: Arc<ScriptedCompleter>,
}

fn config_with(doubles: &Doubles) -> GradingConfig {
    GradingConfig::builder()
        .rasterizer(doubles.rasterizer.clone())
        .extractor(doubles.extractor.clone())
        .completer(doubles.completer.clone())
        .retry_backoff_ms(1)
        .build()
        .expect("valid config")
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_produces_validated_report() {
    let doubles = Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(FakeExtractor::new(
            "1. Paris\n2. Photosynthesis",
            "1. paris\n2. plants eat light",
        )),
        completer: Arc::new(ScriptedCompleter::returning(GOOD_REPORT)),
    };
    let config = config_with(&doubles);

    let report = grade_sheet(&pdf_b64(), &pdf_b64(), &config)
        .await
        .expect("pipeline should succeed");

    assert!(report.markdown.contains("### Question 1"));
    assert_eq!(report.questions.len(), 2);
    for q in &report.questions {
        assert!(q.score <= 10, "score {}/10 out of range", q.score);
        assert!(!q.feedback.is_empty());
    }

    // One extraction per document.
    assert_eq!(doubles.extractor.calls.load(Ordering::SeqCst), 2);

    // Both rasters were created inside the run and removed afterwards.
    let paths = doubles.rasterizer.created_paths();
    assert_eq!(paths.len(), 2);
    for p in &paths {
        assert!(!p.exists(), "raster artifact survived the run: {}", p.display());
    }
}

#[tokio::test]
async fn prompt_reaches_completer_with_both_texts_verbatim() {
    let key_text = "Q1: The mitochondria is the powerhouse of the cell.";
    let student_text = "Q1: mitochondria make energy";
    let doubles = Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(FakeExtractor::new(key_text, student_text)),
        completer: Arc::new(ScriptedCompleter::returning(GOOD_REPORT)),
    };
    let config = config_with(&doubles);

    grade_sheet(&pdf_b64(), &pdf_b64(), &config).await.unwrap();

    let prompts = doubles.completer.seen_prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(key_text));
    assert!(prompts[0].contains(student_text));
}

#[tokio::test]
async fn extraction_failure_surfaces_and_cleans_up() {
    let doubles = Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(
            FakeExtractor::new("key", "student").failing_for(DocumentRole::StudentSheet),
        ),
        completer: Arc::new(ScriptedCompleter::with_responses(vec![])),
    };
    let config = config_with(&doubles);

    let err = grade_sheet(&pdf_b64(), &pdf_b64(), &config)
        .await
        .expect_err("student-sheet extraction is scripted to fail");

    assert!(
        matches!(err, GradeError::ExtractionService { role, .. } if role == "student-sheet"),
        "got: {err:?}"
    );
    assert_eq!(err.stage(), Stage::Extracting);

    // No completion was attempted and no temporary raster remains.
    assert!(doubles.completer.seen_prompts().is_empty());
    for p in doubles.rasterizer.created_paths() {
        assert!(!p.exists(), "raster artifact left behind: {}", p.display());
    }
}

#[tokio::test]
async fn transient_extraction_failure_is_retried_with_raster_intact() {
    let doubles = Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(
            FakeExtractor::new("1. Paris", "1. paris")
                .transiently_failing_for(DocumentRole::StudentSheet, 1),
        ),
        completer: Arc::new(ScriptedCompleter::returning(GOOD_REPORT)),
    };
    let config = config_with(&doubles);

    let report = grade_sheet(&pdf_b64(), &pdf_b64(), &config)
        .await
        .expect("second extraction attempt succeeds");
    assert_eq!(report.questions.len(), 2);

    // Answer key: one call. Student sheet: the failed attempt plus the
    // retry. The double asserts the raster still exists on every call, so
    // the retry read the same artifact; removal happens only afterwards.
    assert_eq!(doubles.extractor.calls.load(Ordering::SeqCst), 3);
    for p in doubles.rasterizer.created_paths() {
        assert!(!p.exists(), "raster artifact survived the run: {}", p.display());
    }
}

#[tokio::test]
async fn empty_extraction_is_valid_and_grading_proceeds() {
    let doubles = Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(FakeExtractor::new("1. Paris", "")),
        completer: Arc::new(ScriptedCompleter::returning(
            "### Question 1\n**Score:** 0/10\n**Feedback:** No answer was provided.\n",
        )),
    };
    let config = config_with(&doubles);

    let report = grade_sheet(&pdf_b64(), &pdf_b64(), &config)
        .await
        .expect("empty student text must not fail the pipeline");
    assert_eq!(report.questions[0].score, 0);
}

#[tokio::test]
async fn empty_completion_is_completion_empty_not_generic() {
    let doubles = Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(FakeExtractor::new("key", "student")),
        completer: Arc::new(ScriptedCompleter::returning("   \n")),
    };
    let config = config_with(&doubles);

    let err = grade_sheet(&pdf_b64(), &pdf_b64(), &config).await.unwrap_err();
    assert!(matches!(err, GradeError::CompletionEmpty), "got: {err:?}");
}

#[tokio::test]
async fn transient_completion_failure_is_retried() {
    let doubles = Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(FakeExtractor::new("key", "student")),
        completer: Arc::new(ScriptedCompleter::with_responses(vec![
            Err(GradeError::CompletionService {
                detail: "HTTP 429".into(),
                retryable: true,
            }),
            Ok(GOOD_REPORT.to_string()),
        ])),
    };
    let config = config_with(&doubles);

    let report = grade_sheet(&pdf_b64(), &pdf_b64(), &config)
        .await
        .expect("second attempt succeeds");
    assert_eq!(report.questions.len(), 2);
    assert_eq!(doubles.completer.seen_prompts().len(), 2);
}

#[tokio::test]
async fn non_retryable_completion_failure_is_not_retried() {
    let doubles = Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(FakeExtractor::new("key", "student")),
        completer: Arc::new(ScriptedCompleter::with_responses(vec![Err(
            GradeError::CompletionService {
                detail: "invalid API key".into(),
                retryable: false,
            },
        )])),
    };
    let config = config_with(&doubles);

    let err = grade_sheet(&pdf_b64(), &pdf_b64(), &config).await.unwrap_err();
    assert!(matches!(err, GradeError::CompletionService { .. }));
    assert_eq!(doubles.completer.seen_prompts().len(), 1);
}

#[tokio::test]
async fn invalid_report_fails_validation_with_raw_attached() {
    let doubles = Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(FakeExtractor::new("key", "student")),
        completer: Arc::new(ScriptedCompleter::returning(
            "The student did okay, maybe a 7 out of 10 overall.",
        )),
    };
    let config = config_with(&doubles);

    let err = grade_sheet(&pdf_b64(), &pdf_b64(), &config).await.unwrap_err();
    match err {
        GradeError::ReportFormat { raw, .. } => {
            assert!(raw.contains("7 out of 10"), "raw completion must be attached");
        }
        other => panic!("expected ReportFormat, got {other:?}"),
    }
}

#[tokio::test]
async fn reprompt_once_recovers_from_invalid_report() {
    let doubles = Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(FakeExtractor::new("key", "student")),
        completer: Arc::new(ScriptedCompleter::with_responses(vec![
            Ok("no structure here".to_string()),
            Ok(GOOD_REPORT.to_string()),
        ])),
    };
    let config = GradingConfig::builder()
        .rasterizer(doubles.rasterizer.clone())
        .extractor(doubles.extractor.clone())
        .completer(doubles.completer.clone())
        .reprompt_on_invalid_report(true)
        .retry_backoff_ms(1)
        .build()
        .unwrap();

    let report = grade_sheet(&pdf_b64(), &pdf_b64(), &config)
        .await
        .expect("re-prompt should recover");
    assert_eq!(report.questions.len(), 2);
    assert_eq!(doubles.completer.seen_prompts().len(), 2);
}

#[tokio::test]
async fn disabled_validation_passes_raw_text_through() {
    let free_form = "Grade summary: solid work overall, nothing structured.";
    let doubles = Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(FakeExtractor::new("key", "student")),
        completer: Arc::new(ScriptedCompleter::returning(free_form)),
    };
    let config = GradingConfig::builder()
        .rasterizer(doubles.rasterizer.clone())
        .extractor(doubles.extractor.clone())
        .completer(doubles.completer.clone())
        .validate_report(false)
        .build()
        .unwrap();

    let report = grade_sheet(&pdf_b64(), &pdf_b64(), &config)
        .await
        .expect("lenient mode never fails on structure");
    assert!(report.markdown.contains(free_form));
    assert!(report.questions.is_empty());
}

#[tokio::test]
async fn bad_base64_is_a_client_side_document_error() {
    let doubles = Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(FakeExtractor::new("key", "student")),
        completer: Arc::new(ScriptedCompleter::with_responses(vec![])),
    };
    let config = config_with(&doubles);

    let err = grade_sheet("&&& not base64 &&&", &pdf_b64(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, GradeError::DocumentFormat { role, .. } if role == "answer-key"));
    assert!(err.is_client_error());
    // Nothing was rasterised for a request that failed at receipt.
    assert!(doubles.rasterizer.created_paths().is_empty());
}

#[tokio::test]
async fn concurrent_runs_do_not_interfere() {
    let make_doubles = |report: &str| Doubles {
        rasterizer: Arc::new(FakeRasterizer::default()),
        extractor: Arc::new(FakeExtractor::new("key", "student")),
        completer: Arc::new(ScriptedCompleter::returning(report)),
    };

    let report_a = "### Question 1\n**Score:** 3/10\n**Feedback:** Largely off-topic.\n";
    let report_b = "### Question 1\n**Score:** 9/10\n**Feedback:** Nearly perfect recall.\n";

    let doubles_a = make_doubles(report_a);
    let doubles_b = make_doubles(report_b);
    let config_a = config_with(&doubles_a);
    let config_b = config_with(&doubles_b);

    let pdf = pdf_b64();
    let (a, b) = tokio::join!(
        grade_sheet(&pdf, &pdf, &config_a),
        grade_sheet(&pdf, &pdf, &config_b),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.questions[0].score, 3);
    assert_eq!(b.questions[0].score, 9);

    // Each run wrote its rasters under its own temp dir: no collisions.
    let mut all_paths = doubles_a.rasterizer.created_paths();
    all_paths.extend(doubles_b.rasterizer.created_paths());
    let unique: std::collections::HashSet<_> = all_paths.iter().collect();
    assert_eq!(unique.len(), all_paths.len(), "temp raster paths collided");
    for p in &all_paths {
        assert!(!p.exists());
    }
}
