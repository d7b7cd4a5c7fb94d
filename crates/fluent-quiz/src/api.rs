//! HTTP gateway for the quiz service.
//!
//! # Endpoints
//!
//! Quiz gateway, per session:
//!
//! - `GET /api/quiz/:session/stats` - Current stats, defaulted
//! - `POST /api/quiz/:session/question` - Generate the next question
//! - `POST /api/quiz/:session/answer` - Grade and record an answer
//! - `DELETE /api/quiz/:session/reset` - Clear stats and history
//!
//! Raw session slots, per key:
//!
//! - `GET|POST|DELETE /api/sessions/:key/quiz-stats`
//! - `GET|POST|DELETE /api/sessions/:key/quiz-history`
//! - `GET|POST|DELETE /api/sessions/:key/history` - Chat history
//!
//! Plus `GET /api/health`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fluent_quiz::{create_router, AppState, Config, MockOracle};
//!
//! # async fn example() -> std::io::Result<()> {
//! let state = AppState::new(Config::default(), Arc::new(MockOracle::demo()));
//!
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8787").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    AnswerOutcome, AnswerSubmission, ChatMessage, Config, Question, QuestionOracle, QuizError,
    QuizHistoryEntry, QuizService, QuizStats, SessionKey, Slot,
};

/// Message returned by the health check.
pub const HEALTH_MESSAGE: &str = "Fluent quiz API is running!";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for the question endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionRequest {
    /// Language to generate a question for.
    #[serde(default)]
    pub language: Option<String>,
}

/// Response body for the question endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
    /// Always `true` on success.
    pub success: bool,
    /// The generated question.
    pub question: Question,
}

/// Response body for the gateway stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Always `true` on success.
    pub success: bool,
    /// Current stats.
    pub stats: QuizStats,
}

/// Response body for the answer endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    /// Always `true` on success.
    pub success: bool,
    /// Feedback and updated stats.
    #[serde(flatten)]
    pub outcome: AnswerOutcome,
}

/// Response body for operations that return nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    /// Always `true` on success.
    pub success: bool,
}

impl SuccessResponse {
    const OK: Self = Self { success: true };
}

/// Response body for the health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"ok"` while the server is up.
    pub status: String,
    /// Human-readable greeting.
    pub message: String,
}

/// Raw `quiz-stats` slot; `null` when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotStats {
    /// Stored stats, if any.
    pub stats: Option<QuizStats>,
}

/// Raw `quiz-history` slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuizHistory {
    /// Stored entries, oldest first.
    pub history: Vec<QuizHistoryEntry>,
}

/// Raw `chat-history` slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotChatHistory {
    /// Stored messages, oldest first.
    pub history: Vec<ChatMessage>,
}

/// Request body for appending to chat history.
#[derive(Debug, Clone, Deserialize)]
pub struct AppendChatRequest {
    /// Message to append.
    pub message: ChatMessage,
}

/// Response body for appending to chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendChatResponse {
    /// Always `true` on success.
    pub success: bool,
    /// Chat history after the append.
    pub history: Vec<ChatMessage>,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Which operation failed, e.g. `"Generate question failed"`.
    pub error: String,
    /// Underlying cause.
    pub details: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Config,
    /// Quiz operations over the session store.
    pub service: QuizService,
}

impl AppState {
    /// Creates state with a fresh session store sized from `config`.
    #[must_use]
    pub fn new(config: Config, oracle: Arc<dyn QuestionOracle>) -> Self {
        let service = QuizService::with_settings(oracle, config.quiz.clone());
        Self { config, service }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// A failed operation, rendered as [`ErrorResponse`].
#[derive(Debug)]
struct ApiError {
    operation: &'static str,
    source: QuizError,
}

impl ApiError {
    fn during(operation: &'static str) -> impl FnOnce(QuizError) -> Self {
        move |source| Self { operation, source }
    }

    const fn status(&self) -> StatusCode {
        match self.source {
            QuizError::Validation { .. } => StatusCode::BAD_REQUEST,
            QuizError::Oracle { .. } => StatusCode::BAD_GATEWAY,
            QuizError::SessionUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.source.is_client_error() {
            warn!(operation = self.operation, error = %self.source, "Request rejected");
        } else {
            error!(operation = self.operation, error = %self.source, "Request failed");
        }

        let body = Json(ErrorResponse {
            error: format!("{} failed", self.operation),
            details: self.source.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router carries permissive CORS (any origin, GET/POST/DELETE/OPTIONS)
/// and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let quiz_routes = Router::new()
        .route("/stats", get(handle_stats))
        .route("/question", post(handle_question))
        .route("/answer", post(handle_answer))
        .route("/reset", delete(handle_reset));

    let session_routes = Router::new()
        .route(
            "/quiz-stats",
            get(get_slot_stats)
                .post(put_slot_stats)
                .delete(delete_slot_stats),
        )
        .route(
            "/quiz-history",
            get(get_slot_quiz_history)
                .post(put_slot_quiz_history)
                .delete(delete_slot_quiz_history),
        )
        .route(
            "/history",
            get(get_slot_chat_history)
                .post(append_slot_chat_history)
                .delete(delete_slot_chat_history),
        );

    let api_routes = Router::new()
        .route("/health", get(handle_health))
        .nest("/quiz/:session", quiz_routes)
        .nest("/sessions/:key", session_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Gateway Handlers
// ============================================================================

/// Handler for `GET /api/health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: HEALTH_MESSAGE.to_string(),
    })
}

/// Handler for `GET /api/quiz/:session/stats`.
async fn handle_stats(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> ApiResult<StatsResponse> {
    let key = SessionKey::new(&session);
    let stats = state
        .service
        .stats(&key)
        .await
        .map_err(ApiError::during("Read stats"))?;

    Ok(Json(StatsResponse {
        success: true,
        stats,
    }))
}

/// Handler for `POST /api/quiz/:session/question`.
async fn handle_question(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(request): Json<QuestionRequest>,
) -> ApiResult<QuestionResponse> {
    let key = SessionKey::new(&session);
    let language = request.language.unwrap_or_default();
    info!(session = %key, %language, "Question requested");

    let question = state
        .service
        .next_question(&key, &language)
        .await
        .map_err(ApiError::during("Generate question"))?;

    Ok(Json(QuestionResponse {
        success: true,
        question,
    }))
}

/// Handler for `POST /api/quiz/:session/answer`.
async fn handle_answer(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(submission): Json<AnswerSubmission>,
) -> ApiResult<AnswerResponse> {
    let key = SessionKey::new(&session);
    info!(session = %key, question_id = ?submission.question_id, "Answer submitted");

    let outcome = state
        .service
        .submit_answer(&key, submission)
        .await
        .map_err(ApiError::during("Submit answer"))?;

    Ok(Json(AnswerResponse {
        success: true,
        outcome,
    }))
}

/// Handler for `DELETE /api/quiz/:session/reset`.
async fn handle_reset(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> ApiResult<SuccessResponse> {
    let key = SessionKey::new(&session);
    state
        .service
        .reset(&key)
        .await
        .map_err(ApiError::during("Reset quiz"))?;
    Ok(Json(SuccessResponse::OK))
}

// ============================================================================
// Session Slot Handlers
// ============================================================================

async fn get_slot_stats(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<SlotStats> {
    let stats = state
        .service
        .store()
        .get_stats(&SessionKey::new(&key))
        .await
        .map_err(ApiError::during("Read quiz-stats"))?;
    Ok(Json(SlotStats { stats }))
}

async fn put_slot_stats(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<SlotStats>,
) -> ApiResult<SuccessResponse> {
    let key = SessionKey::new(&key);
    let store = state.service.store();
    let result = match body.stats {
        Some(stats) => store.put_stats(&key, stats).await,
        None => store.delete(&key, Slot::QuizStats).await,
    };
    result.map_err(ApiError::during("Write quiz-stats"))?;
    Ok(Json(SuccessResponse::OK))
}

async fn delete_slot_stats(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<SuccessResponse> {
    delete_slot(&state, &key, Slot::QuizStats).await
}

async fn get_slot_quiz_history(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<SlotQuizHistory> {
    let history = state
        .service
        .store()
        .get_quiz_history(&SessionKey::new(&key))
        .await
        .map_err(ApiError::during("Read quiz-history"))?;
    Ok(Json(SlotQuizHistory { history }))
}

async fn put_slot_quiz_history(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<SlotQuizHistory>,
) -> ApiResult<SuccessResponse> {
    state
        .service
        .store()
        .put_quiz_history(&SessionKey::new(&key), body.history)
        .await
        .map_err(ApiError::during("Write quiz-history"))?;
    Ok(Json(SuccessResponse::OK))
}

async fn delete_slot_quiz_history(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<SuccessResponse> {
    delete_slot(&state, &key, Slot::QuizHistory).await
}

async fn get_slot_chat_history(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<SlotChatHistory> {
    let history = state
        .service
        .store()
        .get_chat_history(&SessionKey::new(&key))
        .await
        .map_err(ApiError::during("Read history"))?;
    Ok(Json(SlotChatHistory { history }))
}

async fn append_slot_chat_history(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<AppendChatRequest>,
) -> ApiResult<AppendChatResponse> {
    let history = state
        .service
        .store()
        .append_chat(&SessionKey::new(&key), body.message)
        .await
        .map_err(ApiError::during("Append history"))?;
    Ok(Json(AppendChatResponse {
        success: true,
        history,
    }))
}

async fn delete_slot_chat_history(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<SuccessResponse> {
    delete_slot(&state, &key, Slot::ChatHistory).await
}

async fn delete_slot(state: &AppState, key: &str, slot: Slot) -> ApiResult<SuccessResponse> {
    state
        .service
        .store()
        .delete(&SessionKey::new(key), slot)
        .await
        .map_err(ApiError::during("Delete slot"))?;
    info!(session = %key, %slot, "Slot cleared");
    Ok(Json(SuccessResponse::OK))
}

// ============================================================================
// Tests
// ============================================================================
