//! Error types for the Fluent quiz engine.
//!
//! This module defines the error hierarchy for configuration loading,
//! session storage, oracle interaction and request validation.

use std::path::PathBuf;

/// A specialized `Result` type for quiz operations.
pub type Result<T> = std::result::Result<T, QuizError>;

/// Errors that can occur while serving quiz requests.
///
/// Every variant is scoped to a single request; none of them is fatal to the
/// process once the server is running.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your fluent.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Generation Errors
    // ========================================================================
    /// Oracle output did not decode into the expected shape.
    #[error("Generation failed: {reason}")]
    GenerationFailed {
        /// Why the output was rejected.
        reason: String,
    },

    /// The oracle could not be reached or returned an error status.
    #[error("Oracle request failed: {message}")]
    Oracle {
        /// Description of the transport or API failure.
        message: String,
    },

    // ========================================================================
    // Session Store Errors
    // ========================================================================
    /// A session store operation could not complete.
    #[error("Session '{session}' unavailable: {message}")]
    SessionUnavailable {
        /// The session key the operation was addressed to.
        session: String,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Caller-supplied input is missing or malformed.
    #[error("Invalid request: {message}")]
    Validation {
        /// Description of the problem with the input.
        message: String,
    },
}

impl QuizError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `GenerationFailed` error.
    #[must_use]
    pub fn generation_failed(reason: impl Into<String>) -> Self {
        Self::GenerationFailed {
            reason: reason.into(),
        }
    }

    /// Creates a new `Oracle` error.
    #[must_use]
    pub fn oracle(message: impl Into<String>) -> Self {
        Self::Oracle {
            message: message.into(),
        }
    }

    /// Creates a new `SessionUnavailable` error.
    #[must_use]
    pub fn session_unavailable(session: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::SessionUnavailable {
            session: session.to_string(),
            message: message.into(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller is at fault and retrying unchanged will not help.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
