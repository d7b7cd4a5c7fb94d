//! Configuration types for the Fluent quiz server.
//!
//! This module provides the configuration loaded from `fluent.json`: where to
//! listen, how to reach the question oracle, and the quiz engine's window
//! sizes and persistence mode.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::{HISTORY_CAP, PENDING_LOOKUP, RECENT_WINDOW};
use crate::error::{QuizError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "fluent.json";

/// Default bind address.
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Default HTTP port.
const fn default_port() -> u16 {
    8787
}

/// Default OpenAI-compatible API base URL.
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Default chat model.
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Default environment variable holding the oracle API key.
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Default oracle request timeout in seconds.
const fn default_timeout_secs() -> u64 {
    60
}

const fn default_question_temperature() -> f32 {
    0.4
}

const fn default_question_max_tokens() -> u32 {
    500
}

const fn default_feedback_temperature() -> f32 {
    0.7
}

const fn default_feedback_max_tokens() -> u32 {
    100
}

const fn default_history_cap() -> usize {
    HISTORY_CAP
}

const fn default_recent_window() -> usize {
    RECENT_WINDOW
}

const fn default_pending_lookup() -> usize {
    PENDING_LOOKUP
}

const fn default_max_regenerations() -> u32 {
    1
}

/// Main configuration for the quiz server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Question oracle settings.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Quiz engine settings.
    #[serde(default)]
    pub quiz: QuizSettings,
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `fluent.json` in the current directory. If found, loads and
    /// validates the configuration. If not found, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            QuizError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `fluent.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values.
    ///
    /// Returns `QuizError::ConfigValidationError` if the configuration values
    /// are invalid (e.g., a zero history cap, an empty model name).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(QuizError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| QuizError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// Checks that:
    /// - `oracle.baseUrl` and `oracle.model` are not empty
    /// - `oracle.timeoutSecs` is greater than 0
    /// - `quiz.historyCap`, `quiz.recentWindow` and `quiz.pendingLookup` are
    ///   greater than 0
    /// - `quiz.recentWindow` does not exceed `quiz.historyCap`
    ///
    /// # Errors
    ///
    /// Returns `QuizError::ConfigValidationError` if any validation check fails.
    pub fn validate(&self) -> Result<()> {
        if self.oracle.base_url.trim().is_empty() {
            return Err(QuizError::config_validation(
                "oracle.baseUrl must not be empty",
                "Set oracle.baseUrl to an OpenAI-compatible endpoint in your fluent.json",
            ));
        }

        if self.oracle.model.trim().is_empty() {
            return Err(QuizError::config_validation(
                "oracle.model must not be empty",
                "Set oracle.model in your fluent.json",
            ));
        }

        if self.oracle.timeout_secs == 0 {
            return Err(QuizError::config_validation(
                "oracle.timeoutSecs must be greater than 0",
                "Set oracle.timeoutSecs to at least 1 second in your fluent.json",
            ));
        }

        if self.quiz.history_cap == 0 {
            return Err(QuizError::config_validation(
                "quiz.historyCap must be greater than 0",
                "Set quiz.historyCap to at least 1 in your fluent.json",
            ));
        }

        if self.quiz.recent_window == 0 || self.quiz.recent_window > self.quiz.history_cap {
            return Err(QuizError::config_validation(
                format!(
                    "quiz.recentWindow must be between 1 and quiz.historyCap ({})",
                    self.quiz.history_cap
                ),
                "Lower quiz.recentWindow or raise quiz.historyCap in your fluent.json",
            ));
        }

        if self.quiz.pending_lookup == 0 {
            return Err(QuizError::config_validation(
                "quiz.pendingLookup must be greater than 0",
                "Set quiz.pendingLookup to at least 1 in your fluent.json",
            ));
        }

        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Settings for the OpenAI-compatible question oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleConfig {
    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sampling temperature for question generation.
    #[serde(default = "default_question_temperature")]
    pub question_temperature: f32,

    /// Token limit for question generation.
    #[serde(default = "default_question_max_tokens")]
    pub question_max_tokens: u32,

    /// Sampling temperature for answer feedback.
    #[serde(default = "default_feedback_temperature")]
    pub feedback_temperature: f32,

    /// Token limit for answer feedback.
    #[serde(default = "default_feedback_max_tokens")]
    pub feedback_max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            question_temperature: default_question_temperature(),
            question_max_tokens: default_question_max_tokens(),
            feedback_temperature: default_feedback_temperature(),
            feedback_max_tokens: default_feedback_max_tokens(),
        }
    }
}

/// Quiz engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSettings {
    /// Maximum entries kept in `quiz-history` (and `chat-history`).
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// Entries considered by the ladder and the anti-repeat lists.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,

    /// Trailing entries searched for a pending question's difficulty.
    #[serde(default = "default_pending_lookup")]
    pub pending_lookup: usize,

    /// Extra oracle calls allowed when a question repeats the previous one.
    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: u32,

    /// How answer submission writes stats and history.
    #[serde(default)]
    pub answer_writes: AnswerWrites,

    /// Record the difficulty echoed in an answer body when no pending entry
    /// matches its question id. Off: such answers are recorded as beginner.
    #[serde(default)]
    pub trust_reported_difficulty: bool,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            recent_window: default_recent_window(),
            pending_lookup: default_pending_lookup(),
            max_regenerations: default_max_regenerations(),
            answer_writes: AnswerWrites::default(),
            trust_reported_difficulty: false,
        }
    }
}

/// How an answer submission persists stats and history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnswerWrites {
    /// Read-then-write stats, then read-then-write history (default).
    ///
    /// Concurrent answers for one session can lose a stats update.
    #[default]
    TwoStep,
    /// One read-modify-write of both slots inside the session actor.
    Atomic,
}

impl AnswerWrites {
    /// Parses a string into an `AnswerWrites`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "two-step" | "two_step" => Some(Self::TwoStep),
            "atomic" => Some(Self::Atomic),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for AnswerWrites {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid answer writes '{s}': expected one of 'two-step', 'atomic'"
            ))
        })
    }
}

impl Serialize for AnswerWrites {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::TwoStep => "two-step",
            Self::Atomic => "atomic",
        };
        serializer.serialize_str(s)
    }
}
