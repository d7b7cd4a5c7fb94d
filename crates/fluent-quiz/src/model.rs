//! Data model for the adaptive quiz.
//!
//! This module defines the values stored in a session (stats, history
//! entries, chat messages), the difficulty ladder, and the question shape
//! returned to clients.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

// ============================================================================
// SessionKey
// ============================================================================

/// Identifier partitioning all per-learner state.
///
/// Keys are trimmed and lower-cased so `"Quiz_Spanish "` and `"quiz_spanish"`
/// address the same session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    /// Creates a normalized session key from a raw identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use fluent_quiz::SessionKey;
    ///
    /// assert_eq!(SessionKey::new("  Quiz_French ").as_str(), "quiz_french");
    /// ```
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the normalized key is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Difficulty
// ============================================================================

/// The five-level difficulty ladder.
///
/// Ordering follows the ladder: `Beginner < ... < Advanced`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Difficulty {
    /// Ladder index 0.
    #[default]
    Beginner,
    /// Ladder index 1.
    BeginnerIntermediate,
    /// Ladder index 2.
    Intermediate,
    /// Ladder index 3.
    IntermediateAdvanced,
    /// Ladder index 4.
    Advanced,
}

impl Difficulty {
    /// Every level, lowest first.
    pub const LADDER: [Self; 5] = [
        Self::Beginner,
        Self::BeginnerIntermediate,
        Self::Intermediate,
        Self::IntermediateAdvanced,
        Self::Advanced,
    ];

    /// Returns the position of this level on the ladder.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Beginner => 0,
            Self::BeginnerIntermediate => 1,
            Self::Intermediate => 2,
            Self::IntermediateAdvanced => 3,
            Self::Advanced => 4,
        }
    }

    /// Returns the level at `index`, saturating at `Advanced`.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Beginner,
            1 => Self::BeginnerIntermediate,
            2 => Self::Intermediate,
            3 => Self::IntermediateAdvanced,
            _ => Self::Advanced,
        }
    }

    /// Returns the wire label of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::BeginnerIntermediate => "beginner-intermediate",
            Self::Intermediate => "intermediate",
            Self::IntermediateAdvanced => "intermediate-advanced",
            Self::Advanced => "advanced",
        }
    }

    /// Parses a wire label, returning `None` for anything off the ladder.
    ///
    /// # Examples
    ///
    /// ```
    /// use fluent_quiz::Difficulty;
    ///
    /// assert_eq!(Difficulty::parse("intermediate"), Some(Difficulty::Intermediate));
    /// assert_eq!(Difficulty::parse("expert"), None);
    /// ```
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        Self::LADDER.into_iter().find(|level| level.as_str() == label)
    }

    /// Deserializes a possibly missing, null or unrecognized label as a level,
    /// falling back to `Beginner`.
    pub(crate) fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(Self::parse).unwrap_or_default())
    }

    /// Like [`Self::deserialize_lenient`] but keeps "not recognized" distinct.
    pub(crate) fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<Self>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(Self::parse))
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// QuizStats
// ============================================================================

/// Running totals for a quiz session.
///
/// `correct <= total` always holds for stats produced by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizStats {
    /// Number of correctly answered questions.
    #[serde(default)]
    pub correct: u32,
    /// Number of answered questions.
    #[serde(default)]
    pub total: u32,
    /// Current unbroken run of correct answers.
    #[serde(default)]
    pub streak: u32,
}

// ============================================================================
// QuizHistoryEntry
// ============================================================================

/// One graded answer in the quiz history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizHistoryEntry {
    /// Identifier of the question that was answered.
    #[serde(default)]
    pub question_id: String,

    /// The question text as shown to the learner.
    #[serde(default)]
    pub question_text: String,

    /// The learner's submitted answer.
    #[serde(default)]
    pub answer: String,

    /// The expected answer.
    #[serde(default)]
    pub correct_answer: String,

    /// Whether the answer was graded correct.
    #[serde(default)]
    pub is_correct: bool,

    /// Difficulty assigned when the question was generated.
    #[serde(default, deserialize_with = "Difficulty::deserialize_lenient")]
    pub difficulty: Difficulty,

    /// When the answer was graded.
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Whether this entry records an answer (always `true` for engine entries).
    #[serde(default)]
    pub answered: bool,
}

/// Wire shapes accepted for a timestamp.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    EpochMillis(i64),
    Rfc3339(String),
}

/// Decodes an RFC 3339 string or a count of milliseconds since the Unix
/// epoch. `null` decodes as the current time.
pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawTimestamp>::deserialize(deserializer)? {
        None => Ok(Utc::now()),
        Some(RawTimestamp::EpochMillis(millis)) => DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| de::Error::custom(format!("timestamp {millis} is out of range"))),
        Some(RawTimestamp::Rfc3339(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|e| de::Error::custom(format!("invalid timestamp '{text}': {e}"))),
    }
}

// ============================================================================
// ChatMessage
// ============================================================================

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions for the oracle.
    System,
    /// The learner.
    User,
    /// The oracle.
    Assistant,
}

/// One message in the `chat-history` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: ChatRole,
    /// Message body.
    pub content: String,
    /// When the message was recorded.
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Creates a new `ChatMessage` with the current timestamp.
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Question
// ============================================================================

/// The answer format of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    /// Pick one of four options.
    MultipleChoice {
        /// The four candidate answers, in display order.
        options: Vec<String>,
    },
    /// Type a short free-form answer.
    Written,
}

/// A question as decoded from the oracle, before it is stamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    /// Answer format.
    #[serde(flatten)]
    pub kind: QuestionKind,
    /// The prompt shown to the learner.
    pub question: String,
    /// The expected answer.
    pub correct_answer: String,
    /// A translation or nudge shown alongside the question.
    pub hint: String,
}

impl GeneratedQuestion {
    /// Attaches an identifier and difficulty, producing a client-facing question.
    #[must_use]
    pub fn stamp(self, id: impl Into<String>, difficulty: Difficulty) -> Question {
        Question {
            id: id.into(),
            body: self,
            difficulty,
        }
    }
}

/// A question returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier, echoed back on answer.
    pub id: String,
    /// The generated content.
    #[serde(flatten)]
    pub body: GeneratedQuestion,
    /// Difficulty the engine asked for.
    pub difficulty: Difficulty,
}

// ============================================================================
// Tests
// ============================================================================
