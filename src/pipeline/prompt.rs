//! Grading-prompt construction.
//!
//! [`build_prompt`] is a pure function: given the same two extracted texts
//! it produces byte-identical output, so a grading run is reproducible from
//! its inputs. Both texts are embedded **verbatim** — no trimming, no
//! truncation — inside clearly labelled delimiter fences so the completion
//! stage can never confuse the key with the submission.
//!
//! ## Delimiter collision handling
//!
//! The extracted texts are untrusted data. If a source text happened to
//! contain the delimiter sequence, a crafted submission could break out of
//! its fence and be read as instructions. The builder therefore escalates
//! the delimiter (`---`, `-----`, `-------`, …) until it appears in
//! neither text, deterministically, so the injection-resistance property
//! holds without sacrificing reproducibility.

use crate::pipeline::extract::ExtractedText;
use crate::prompts::{
    GRADING_INSTRUCTIONS, GRADING_PREAMBLE, POINTS_PER_QUESTION, REPORT_SCHEMA_EXAMPLE,
};

/// A fully composed grading request. Single text blob, ready for the
/// completion backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingPrompt {
    pub text: String,
}

/// Pick a `-` fence that occurs as a substring in neither text.
///
/// Starts at the traditional `---` and grows by two dashes per collision.
/// Growth is bounded only by the input (a text of length n can contain at
/// most n distinct dash runs), so this terminates.
fn choose_delimiter(answer_key: &str, student: &str) -> String {
    let mut delimiter = "---".to_string();
    while answer_key.contains(&delimiter) || student.contains(&delimiter) {
        delimiter.push_str("--");
    }
    delimiter
}

/// Compose the grading prompt from the two extracted texts.
///
/// Deterministic and total: empty texts are embedded as empty sections and
/// still yield a well-formed prompt — an empty sheet is graded as an empty
/// sheet, never rejected here.
pub fn build_prompt(answer_key: &ExtractedText, student: &ExtractedText) -> GradingPrompt {
    let delimiter = choose_delimiter(&answer_key.text, &student.text);
    let instructions =
        GRADING_INSTRUCTIONS.replace("{points}", &POINTS_PER_QUESTION.to_string());

    let text = format!(
        "{preamble}\n\n\
         Here is the text extracted from the teacher's Answer Key:\n\
         {delimiter}\n\
         {key}\n\
         {delimiter}\n\n\
         Here is the text extracted from the Student's Answer Sheet:\n\
         {delimiter}\n\
         {student}\n\
         {delimiter}\n\n\
         {instructions}\n\n\
         {schema}\n",
        preamble = GRADING_PREAMBLE,
        delimiter = delimiter,
        key = answer_key.text,
        student = student.text,
        instructions = instructions,
        schema = REPORT_SCHEMA_EXAMPLE,
    );

    GradingPrompt { text }
}
