//! Tolerant decoding of oracle output.
//!
//! Oracles are asked for bare JSON but frequently wrap it in Markdown code
//! fences. Everything here is a pure function: fences are stripped, the rest
//! is decoded, and failure is reported as an [`Unparsable`] value rather than
//! a panic.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::engine::normalize;
use crate::error::QuizError;
use crate::model::{GeneratedQuestion, QuestionKind};

/// Number of options a multiple-choice question must carry.
pub const MULTIPLE_CHOICE_OPTIONS: usize = 4;

// Opening or closing fence with an optional language tag (```json, ```JSON, ```).
const FENCE_PATTERN: &str = r"(?i)```[a-z0-9_+\-]*";

/// Oracle output that could not be turned into the expected value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unparsable oracle output: {reason}")]
pub struct Unparsable {
    /// Why decoding failed.
    pub reason: String,
}

impl Unparsable {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<Unparsable> for QuizError {
    fn from(err: Unparsable) -> Self {
        Self::generation_failed(err.reason)
    }
}

/// Removes every code-fence marker and trims surrounding whitespace.
///
/// # Examples
///
/// ```
/// use fluent_quiz::parser::strip_fences;
///
/// assert_eq!(strip_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
/// assert_eq!(strip_fences("  {\"a\": 1} "), "{\"a\": 1}");
/// ```
#[must_use]
pub fn strip_fences(raw: &str) -> String {
    let Ok(re) = Regex::new(FENCE_PATTERN) else {
        return raw.trim().to_string();
    };

    re.replace_all(raw, "").trim().to_string()
}

/// Strips fences and decodes the remainder as `T`.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, Unparsable> {
    let text = strip_fences(raw);
    if text.is_empty() {
        return Err(Unparsable::new("empty output"));
    }
    serde_json::from_str(&text).map_err(|e| Unparsable::new(e.to_string()))
}

/// Loosely-typed question as the oracle emits it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    correct_answer: String,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    hint: Option<String>,
}

impl TryFrom<RawQuestion> for GeneratedQuestion {
    type Error = Unparsable;

    fn try_from(raw: RawQuestion) -> Result<Self, Self::Error> {
        if raw.question.trim().is_empty() {
            return Err(Unparsable::new("question text is empty"));
        }
        if raw.correct_answer.trim().is_empty() {
            return Err(Unparsable::new("correctAnswer is empty"));
        }

        let kind = match raw.kind.as_str() {
            "multiple_choice" => {
                let options = raw.options.unwrap_or_default();
                if options.len() != MULTIPLE_CHOICE_OPTIONS {
                    return Err(Unparsable::new(format!(
                        "multiple_choice needs {MULTIPLE_CHOICE_OPTIONS} options, got {}",
                        options.len()
                    )));
                }
                let expected = normalize(&raw.correct_answer);
                if !options.iter().any(|option| normalize(option) == expected) {
                    return Err(Unparsable::new("correctAnswer is not one of the options"));
                }
                QuestionKind::MultipleChoice { options }
            }
            "written" => QuestionKind::Written,
            other => {
                return Err(Unparsable::new(format!("unknown question type '{other}'")));
            }
        };

        Ok(Self {
            kind,
            question: raw.question,
            correct_answer: raw.correct_answer,
            hint: raw.hint.unwrap_or_default(),
        })
    }
}

/// Decodes oracle output into a question, rejecting shapes that match
/// neither the multiple-choice nor the written variant.
pub fn parse_question(raw: &str) -> Result<GeneratedQuestion, Unparsable> {
    let draft: RawQuestion = parse_json(raw)?;
    GeneratedQuestion::try_from(draft)
}
