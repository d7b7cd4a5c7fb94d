//! Text-generation oracle used to write questions and feedback.
//!
//! The engine treats the oracle as a black box: it hands over a
//! [`GenerationContext`] and gets raw text back, which is decoded by
//! [`crate::parser`]. [`HttpOracle`] talks to any OpenAI-compatible chat
//! completions endpoint; [`MockOracle`] replays scripted output.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::OracleConfig;
use crate::engine::GenerationContext;
use crate::error::{QuizError, Result};

/// What the oracle needs to write feedback for a graded answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackContext {
    /// Language being practised.
    pub language: String,
    /// The learner's answer.
    pub answer: String,
    /// The expected answer.
    pub correct_answer: String,
    /// Outcome of grading.
    pub is_correct: bool,
}

/// A source of generated questions and feedback.
#[async_trait]
pub trait QuestionOracle: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns raw text expected to encode one question as JSON.
    async fn generate_question(&self, context: &GenerationContext) -> Result<String>;

    /// Returns a short free-text explanation for a graded answer.
    async fn feedback(&self, context: &FeedbackContext) -> Result<String>;
}

// ============================================================================
// Prompts
// ============================================================================

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}

/// System prompt for question generation.
fn question_system_prompt(context: &GenerationContext) -> String {
    let language = &context.language;
    format!(
        "You are a {language} vocabulary tutor.\n\
         Output strictly valid JSON, no markdown and no extra text, shaped as:\n\
         {{\"type\": \"multiple_choice\" | \"written\", \"question\": \"...\", \
         \"correctAnswer\": \"...\", \"options\": [4 strings, multiple_choice only], \
         \"hint\": \"English translation of the question\"}}\n\
         Multiple choice questions have exactly 4 options, one of them correct. \
         Written answers are 1-3 words. Mix {language} to English and English to {language}."
    )
}

/// User prompt for question generation, carrying the anti-repeat constraints.
pub(crate) fn question_user_prompt(context: &GenerationContext) -> String {
    let level = context
        .difficulty_hint
        .map_or("beginner", crate::model::Difficulty::as_str);
    let mut prompt = format!(
        "Generate one {level} level {} vocabulary question.\n\
         Recently answered correctly (do NOT repeat): {}\n\
         Recently failed (may repeat later): {}",
        context.language,
        join_or_none(&context.avoid_list),
        join_or_none(&context.failed_list),
    );
    if let Some(last) = &context.last_question {
        prompt.push_str(&format!("\nNever repeat the previous question: {last}"));
    }
    prompt
}

/// Prompts for answer feedback.
pub(crate) fn feedback_prompts(context: &FeedbackContext) -> (String, String) {
    let system = format!(
        "You are a {} teacher providing feedback. Be encouraging and educational.",
        context.language
    );
    let verdict = if context.is_correct {
        "Praise them briefly."
    } else {
        "Explain the correct answer and why it matters."
    };
    let user = format!(
        "The student answered \"{}\" when the correct answer was \"{}\". {verdict} Keep it under 30 words.",
        context.answer, context.correct_answer
    );
    (system, user)
}

// ============================================================================
// HttpOracle
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

/// Oracle backed by an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    config: OracleConfig,
    api_key: Option<String>,
}

impl HttpOracle {
    /// Creates an oracle with an explicit API key.
    pub fn new(config: OracleConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QuizError::oracle(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Creates an oracle reading the API key from `config.api_key_env`.
    ///
    /// A missing variable is allowed; requests are then sent unauthenticated,
    /// which is what local OpenAI-compatible servers expect.
    pub fn from_config(config: OracleConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            debug!(var = %config.api_key_env, "No oracle API key set");
        }
        Self::new(config, api_key)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn complete(
        &self,
        system: String,
        user: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatRequestMessage {
                    role: "system",
                    content: system,
                },
                ChatRequestMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            max_tokens,
        };

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                QuizError::oracle(format!(
                    "request timed out after {}s",
                    self.config.timeout_secs
                ))
            } else {
                QuizError::oracle(format!("network error: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(QuizError::oracle(format!(
                "HTTP {}: {text}",
                status.as_u16()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| QuizError::oracle(format!("failed to parse response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| QuizError::oracle("response contained no choices"))
    }
}

#[async_trait]
impl QuestionOracle for HttpOracle {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, context), fields(model = %self.config.model, language = %context.language))]
    async fn generate_question(&self, context: &GenerationContext) -> Result<String> {
        self.complete(
            question_system_prompt(context),
            question_user_prompt(context),
            self.config.question_temperature,
            self.config.question_max_tokens,
        )
        .await
    }

    #[instrument(skip(self, context), fields(model = %self.config.model, correct = context.is_correct))]
    async fn feedback(&self, context: &FeedbackContext) -> Result<String> {
        let (system, user) = feedback_prompts(context);
        self.complete(
            system,
            user,
            self.config.feedback_temperature,
            self.config.feedback_max_tokens,
        )
        .await
    }
}

// ============================================================================
// MockOracle
// ============================================================================

/// A scripted oracle for tests and offline runs.
///
/// Question responses are replayed in order. Once the script runs out,
/// question calls fail unless the oracle was built with [`MockOracle::cycling`].
#[derive(Debug, Default)]
pub struct MockOracle {
    questions: Mutex<VecDeque<String>>,
    cycle: bool,
    feedback: Option<String>,
    contexts: Mutex<Vec<GenerationContext>>,
    feedback_contexts: Mutex<Vec<FeedbackContext>>,
}

impl MockOracle {
    /// Creates a mock that replays `questions` once each.
    #[must_use]
    pub fn with_questions<I, S>(questions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            questions: Mutex::new(questions.into_iter().map(Into::into).collect()),
            feedback: Some("Well done!".to_string()),
            ..Self::default()
        }
    }

    /// Creates a mock that loops over a small Spanish question set.
    #[must_use]
    pub fn demo() -> Self {
        Self::with_questions([
            r#"{"type": "multiple_choice", "question": "¿Qué significa 'rojo'?", "correctAnswer": "red", "options": ["red", "blue", "green", "yellow"], "hint": "What does 'rojo' mean?"}"#,
            r#"```json
{"type": "written", "question": "¿Cómo se dice 'cat' en español?", "correctAnswer": "gato", "hint": "How do you say 'cat' in Spanish?"}
```"#,
            r#"{"type": "multiple_choice", "question": "¿Qué significa 'manzana'?", "correctAnswer": "apple", "options": ["pear", "apple", "grape", "orange"], "hint": "What does 'manzana' mean?"}"#,
        ])
        .cycling()
    }

    /// Replays the script forever instead of once.
    #[must_use]
    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Sets the text returned for every feedback call.
    #[must_use]
    pub fn with_feedback(mut self, text: impl Into<String>) -> Self {
        self.feedback = Some(text.into());
        self
    }

    /// Makes every feedback call fail.
    #[must_use]
    pub fn failing_feedback(mut self) -> Self {
        self.feedback = None;
        self
    }

    /// Generation contexts received so far, oldest first.
    pub fn contexts(&self) -> Vec<GenerationContext> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Feedback contexts received so far, oldest first.
    pub fn feedback_contexts(&self) -> Vec<FeedbackContext> {
        self.feedback_contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of question calls made.
    pub fn question_calls(&self) -> usize {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl QuestionOracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_question(&self, context: &GenerationContext) -> Result<String> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(context.clone());

        let mut questions = self
            .questions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let next = questions
            .pop_front()
            .ok_or_else(|| QuizError::oracle("mock oracle has no scripted question left"))?;
        if self.cycle {
            questions.push_back(next.clone());
        }
        Ok(next)
    }

    async fn feedback(&self, context: &FeedbackContext) -> Result<String> {
        self.feedback_contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(context.clone());

        self.feedback
            .clone()
            .ok_or_else(|| QuizError::oracle("mock oracle feedback disabled"))
    }
}

// ============================================================================
// Tests
// ============================================================================
