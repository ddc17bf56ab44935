//! Report parsing and structural validation.
//!
//! The completion backend is told (see [`crate::prompts`]) to emit a
//! sequence of blocks:
//!
//! ```text
//! ### Question <n>
//! **Score:** <k>/10
//! **Feedback:** <sentence>
//! ```
//!
//! Models mostly comply but occasionally wrap the whole report in Markdown
//! fences, use CRLF line endings, or drift from the schema entirely. This
//! module first applies a small set of deterministic normalisation rules
//! (the cheap, content-preserving kind), then validates the block
//! structure. Validation failure carries the raw text in the error rather
//! than attempting automatic repair — malformed model output is surfaced,
//! never silently passed through.
//!
//! The original service returned the completion unconditionally; validation
//! here is a deliberate hardening and can be switched off via
//! [`crate::config::GradingConfigBuilder::validate_report`].

use crate::error::GradeError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Points per question; a valid score is an integer in `[0, MAX_SCORE]`.
pub const MAX_SCORE: u32 = crate::prompts::POINTS_PER_QUESTION;

/// One graded question parsed out of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionGrade {
    /// Question number as labelled by the model.
    pub number: u32,
    /// Score out of [`MAX_SCORE`].
    pub score: u32,
    /// Constructive feedback sentence.
    pub feedback: String,
}

/// The final grading report: the full Markdown plus its parsed blocks.
#[derive(Debug, Clone, Serialize)]
pub struct GradingReport {
    /// Normalised Markdown, as returned to the caller.
    pub markdown: String,
    /// Per-question grades. Empty only when validation is disabled and the
    /// text did not match the block structure.
    pub questions: Vec<QuestionGrade>,
}

impl GradingReport {
    /// Sum of awarded points across parsed questions.
    pub fn total_score(&self) -> u32 {
        self.questions.iter().map(|q| q.score).sum()
    }

    /// Maximum achievable points across parsed questions.
    pub fn max_total(&self) -> u32 {
        self.questions.len() as u32 * MAX_SCORE
    }
}

// ── Normalisation ────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown)?\n(.*)\n```\s*$").unwrap());

/// Strip a single pair of outer ```markdown fences, if present.
fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

/// Content-preserving cleanup applied before validation.
pub fn normalise_report(raw: &str) -> String {
    let s = strip_markdown_fences(raw);
    let s = normalise_line_endings(&s);
    ensure_final_newline(&s)
}

// ── Parsing and validation ───────────────────────────────────────────────

static RE_QUESTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^###\s+Question\s+(\d+)\s*$").unwrap());
static RE_SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\*\*Score:\*\*\s*(\d+)\s*/\s*(\d+)\s*$").unwrap());
static RE_FEEDBACK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\*\*Feedback:\*\*\s*(.*)$").unwrap());

/// Scan question blocks without judging them. Used by the lenient path.
fn scan_blocks(markdown: &str) -> Vec<(u32, &str)> {
    let mut blocks = Vec::new();
    let headers: Vec<_> = RE_QUESTION.captures_iter(markdown).collect();
    for (i, caps) in headers.iter().enumerate() {
        let number: u32 = match caps[1].parse() {
            Ok(n) => n,
            Err(_) => continue, // number overflow; skip the block
        };
        let start = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(markdown.len());
        blocks.push((number, &markdown[start..end]));
    }
    blocks
}

/// Parse one block's score and feedback, enforcing the schema.
fn parse_block(number: u32, body: &str) -> Result<QuestionGrade, String> {
    let score_caps = RE_SCORE
        .captures(body)
        .ok_or_else(|| format!("question {number}: missing '**Score:** k/{MAX_SCORE}' line"))?;

    let score: u32 = score_caps[1]
        .parse()
        .map_err(|_| format!("question {number}: score is not a number"))?;
    let denominator: u32 = score_caps[2]
        .parse()
        .map_err(|_| format!("question {number}: score denominator is not a number"))?;

    if denominator != MAX_SCORE {
        return Err(format!(
            "question {number}: score denominator must be {MAX_SCORE}, got {denominator}"
        ));
    }
    if score > MAX_SCORE {
        return Err(format!(
            "question {number}: score {score}/{MAX_SCORE} is out of range"
        ));
    }

    let feedback = RE_FEEDBACK
        .captures(body)
        .map(|c| c[1].trim().to_string())
        .ok_or_else(|| format!("question {number}: missing '**Feedback:**' line"))?;

    if feedback.is_empty() {
        return Err(format!("question {number}: feedback is empty"));
    }

    Ok(QuestionGrade {
        number,
        score,
        feedback,
    })
}

/// Validate the completion text against the required report structure.
///
/// Normalises first, then requires at least one question block, each with
/// an in-range `k/10` score and non-empty feedback. On failure the raw
/// (un-normalised) completion is attached to the error for diagnosis.
pub fn parse_report(raw: &str) -> Result<GradingReport, GradeError> {
    let markdown = normalise_report(raw);

    let blocks = scan_blocks(&markdown);
    if blocks.is_empty() {
        return Err(GradeError::ReportFormat {
            detail: "no '### Question <n>' blocks found".into(),
            raw: raw.to_string(),
        });
    }

    let mut questions = Vec::with_capacity(blocks.len());
    for (number, body) in blocks {
        match parse_block(number, body) {
            Ok(q) => questions.push(q),
            Err(detail) => {
                return Err(GradeError::ReportFormat {
                    detail,
                    raw: raw.to_string(),
                });
            }
        }
    }

    Ok(GradingReport {
        markdown,
        questions,
    })
}

/// Lenient path used when validation is disabled: normalise, keep whatever
/// blocks parse, never fail. This is the original pass-through behavior.
pub fn lenient_report(raw: &str) -> GradingReport {
    let markdown = normalise_report(raw);
    let questions = scan_blocks(&markdown)
        .into_iter()
        .filter_map(|(number, body)| parse_block(number, body).ok())
        .collect();
    GradingReport {
        markdown,
        questions,
    }
}
