//! Quiz orchestration on top of the store, engine and oracle.
//!
//! [`QuizService`] is what the HTTP gateway calls. Each method maps to one
//! gateway route and is usable directly from tests without a server.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{AnswerWrites, QuizSettings};
use crate::engine::{grade, next_stats, QuizEngine};
use crate::error::{QuizError, Result};
use crate::model::{Difficulty, Question, QuizHistoryEntry, QuizStats, SessionKey};
use crate::oracle::{FeedbackContext, QuestionOracle};
use crate::parser::parse_question;
use crate::store::{SessionStore, Slot};

/// An answer as submitted by a client. Every field is optional on the wire
/// so that missing input is reported as a validation error, not a decode
/// failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    /// Language being practised.
    #[serde(default)]
    pub language: Option<String>,
    /// Text of the question being answered.
    #[serde(default)]
    pub question_text: Option<String>,
    /// Id stamped on the question when it was generated.
    #[serde(default)]
    pub question_id: Option<String>,
    /// The learner's answer.
    #[serde(default)]
    pub answer: Option<String>,
    /// The expected answer.
    #[serde(default)]
    pub correct_answer: Option<String>,
    /// Difficulty the client was shown. Only recorded when
    /// `trustReportedDifficulty` is set; unknown labels are ignored.
    #[serde(default, deserialize_with = "Difficulty::deserialize_optional")]
    pub difficulty: Option<Difficulty>,
}

/// A submission that passed validation.
#[derive(Debug, Clone)]
struct ValidAnswer {
    language: String,
    question_text: String,
    question_id: String,
    answer: String,
    correct_answer: String,
    difficulty: Option<Difficulty>,
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(QuizError::validation(format!("{field} is required"))),
    }
}

impl AnswerSubmission {
    fn validate(self) -> Result<ValidAnswer> {
        Ok(ValidAnswer {
            language: required(self.language, "language")?,
            question_text: required(self.question_text, "questionText")?,
            question_id: self.question_id.unwrap_or_default(),
            // an empty answer is a wrong answer, not a malformed request
            answer: self
                .answer
                .ok_or_else(|| QuizError::validation("answer is required"))?,
            correct_answer: required(self.correct_answer, "correctAnswer")?,
            difficulty: self.difficulty,
        })
    }
}

impl ValidAnswer {
    fn history_entry(
        &self,
        engine: &QuizEngine,
        history: &[QuizHistoryEntry],
        is_correct: bool,
    ) -> QuizHistoryEntry {
        QuizHistoryEntry {
            question_id: self.question_id.clone(),
            question_text: self.question_text.clone(),
            answer: self.answer.clone(),
            correct_answer: self.correct_answer.clone(),
            is_correct,
            difficulty: engine.assigned_difficulty(history, &self.question_id, self.difficulty),
            timestamp: Utc::now(),
            answered: true,
        }
    }

    fn fallback_explanation(&self, is_correct: bool) -> String {
        if is_correct {
            "Correct, well done!".to_string()
        } else {
            format!("The correct answer is \"{}\".", self.correct_answer)
        }
    }
}

/// Feedback returned for a graded answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    /// Outcome of grading.
    pub is_correct: bool,
    /// Short explanation written by the oracle.
    pub explanation: String,
    /// The expected answer, only when the learner got it wrong.
    pub correct_answer: Option<String>,
}

/// Result of submitting an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOutcome {
    /// Feedback for the learner.
    pub feedback: Feedback,
    /// Stats after this answer.
    pub stats: QuizStats,
}

/// Adaptive quiz operations for every session.
#[derive(Clone)]
pub struct QuizService {
    store: SessionStore,
    engine: QuizEngine,
    oracle: Arc<dyn QuestionOracle>,
    settings: QuizSettings,
}

impl fmt::Debug for QuizService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizService")
            .field("store", &self.store)
            .field("engine", &self.engine)
            .field("oracle", &self.oracle.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl QuizService {
    /// Creates a service over an existing store.
    #[must_use]
    pub fn new(store: SessionStore, oracle: Arc<dyn QuestionOracle>, settings: QuizSettings) -> Self {
        Self {
            store,
            engine: QuizEngine::new(&settings),
            oracle,
            settings,
        }
    }

    /// Creates a service with a fresh store sized from `settings`.
    #[must_use]
    pub fn with_settings(oracle: Arc<dyn QuestionOracle>, settings: QuizSettings) -> Self {
        Self::new(SessionStore::new(settings.history_cap), oracle, settings)
    }

    /// The underlying session store.
    #[must_use]
    pub const fn store(&self) -> &SessionStore {
        &self.store
    }

    /// The engine parameters in use.
    #[must_use]
    pub const fn engine(&self) -> &QuizEngine {
        &self.engine
    }

    /// Current stats, `{0, 0, 0}` if the session never answered.
    pub async fn stats(&self, key: &SessionKey) -> Result<QuizStats> {
        Ok(self.store.get_stats(key).await?.unwrap_or_default())
    }

    /// Generates the next question for `key`.
    ///
    /// Reads quiz history but writes nothing, so a cancelled or failed call
    /// leaves the session untouched.
    #[instrument(skip(self), fields(session = %key))]
    pub async fn next_question(&self, key: &SessionKey, language: &str) -> Result<Question> {
        let language = language.trim();
        if language.is_empty() {
            return Err(QuizError::validation("language is required"));
        }

        let history = self.store.get_quiz_history(key).await?;
        let context = self.engine.generation_context(language, &history);
        let difficulty = context.difficulty_hint.unwrap_or_default();
        debug!(
            %difficulty,
            avoid = context.avoid_list.len(),
            failed = context.failed_list.len(),
            "Built generation context"
        );

        let mut regenerations = 0;
        let generated = loop {
            let raw = self.oracle.generate_question(&context).await?;
            let candidate = parse_question(&raw).map_err(|e| {
                warn!(reason = %e.reason, "Oracle output was not a valid question");
                QuizError::from(e)
            })?;

            if !context.is_immediate_repeat(&candidate) {
                break candidate;
            }
            if regenerations >= self.settings.max_regenerations {
                warn!(
                    attempts = regenerations + 1,
                    "Oracle kept repeating the previous question, returning it anyway"
                );
                break candidate;
            }
            regenerations += 1;
            debug!(regenerations, "Rejected repeat of previous question");
        };

        let question = generated.stamp(Uuid::new_v4().to_string(), difficulty);
        info!(id = %question.id, %difficulty, "Generated question");
        Ok(question)
    }

    /// Grades an answer, records it and asks the oracle for feedback.
    ///
    /// Stats and history are written before feedback is requested. A
    /// feedback failure falls back to a fixed explanation.
    #[instrument(skip(self, submission), fields(session = %key))]
    pub async fn submit_answer(
        &self,
        key: &SessionKey,
        submission: AnswerSubmission,
    ) -> Result<AnswerOutcome> {
        let answer = submission.validate()?;
        let is_correct = grade(&answer.answer, &answer.correct_answer);

        let stats = match self.settings.answer_writes {
            AnswerWrites::TwoStep => self.record_two_step(key, &answer, is_correct).await?,
            AnswerWrites::Atomic => self.record_atomic(key, answer.clone(), is_correct).await?,
        };
        info!(
            is_correct,
            total = stats.total,
            streak = stats.streak,
            "Recorded answer"
        );

        let context = FeedbackContext {
            language: answer.language.clone(),
            answer: answer.answer.clone(),
            correct_answer: answer.correct_answer.clone(),
            is_correct,
        };
        let explanation = match self.oracle.feedback(&context).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => answer.fallback_explanation(is_correct),
            Err(e) => {
                warn!(error = %e, "Feedback unavailable, using fallback");
                answer.fallback_explanation(is_correct)
            }
        };

        Ok(AnswerOutcome {
            feedback: Feedback {
                is_correct,
                explanation,
                correct_answer: (!is_correct).then_some(answer.correct_answer),
            },
            stats,
        })
    }

    /// Clears quiz stats and history. Chat history is kept.
    #[instrument(skip(self), fields(session = %key))]
    pub async fn reset(&self, key: &SessionKey) -> Result<()> {
        self.store.delete(key, Slot::QuizStats).await?;
        self.store.delete(key, Slot::QuizHistory).await?;
        info!("Quiz reset");
        Ok(())
    }

    /// Two store round trips per slot. Concurrent answers for one key can
    /// lose updates, and cancellation between the writes leaves stats
    /// updated without a history entry.
    async fn record_two_step(
        &self,
        key: &SessionKey,
        answer: &ValidAnswer,
        is_correct: bool,
    ) -> Result<QuizStats> {
        let current = self.store.get_stats(key).await?.unwrap_or_default();
        let stats = next_stats(current, is_correct);
        self.store.put_stats(key, stats).await?;

        let mut history = self.store.get_quiz_history(key).await?;
        let entry = answer.history_entry(&self.engine, &history, is_correct);
        self.engine.record(&mut history, entry);
        self.store.put_quiz_history(key, history).await?;

        Ok(stats)
    }

    async fn record_atomic(
        &self,
        key: &SessionKey,
        answer: ValidAnswer,
        is_correct: bool,
    ) -> Result<QuizStats> {
        let engine = self.engine;
        self.store
            .update(key, move |slots| {
                let stats = next_stats(slots.quiz_stats.unwrap_or_default(), is_correct);
                slots.quiz_stats = Some(stats);
                let entry = answer.history_entry(&engine, &slots.quiz_history, is_correct);
                engine.record(&mut slots.quiz_history, entry);
                stats
            })
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================
