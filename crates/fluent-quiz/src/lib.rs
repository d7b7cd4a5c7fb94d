//! Fluent adaptive quiz
//!
//! Per-session quiz state, the difficulty ladder, oracle-backed question
//! generation, and the HTTP gateway that exposes them.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod oracle;
pub mod parser;
pub mod service;
pub mod store;

pub use api::{
    create_router, AnswerResponse, AppState, ErrorResponse, HealthResponse, QuestionRequest,
    QuestionResponse, StatsResponse, SuccessResponse,
};
pub use config::{AnswerWrites, Config, OracleConfig, QuizSettings, ServerConfig};
pub use engine::{GenerationContext, QuizEngine, RecentPerformance};
pub use error::{QuizError, Result};
pub use model::{
    ChatMessage, ChatRole, Difficulty, GeneratedQuestion, Question, QuestionKind,
    QuizHistoryEntry, QuizStats, SessionKey,
};
pub use oracle::{FeedbackContext, HttpOracle, MockOracle, QuestionOracle};
pub use parser::Unparsable;
pub use service::{AnswerOutcome, AnswerSubmission, Feedback, QuizService};
pub use store::{SessionSlots, SessionStore, Slot};
