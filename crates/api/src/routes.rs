//! HTTP route handlers for the API.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use devbot_chat::HistoryRecord;
use devbot_common::DevbotError;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub model: String,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        model: state.chat.model_name().to_string(),
    })
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub code: &'static str,
}

impl ApiError {
    fn bad_request(error: impl Into<String>, code: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            code,
        }
    }

    pub(crate) fn unauthorized(error: impl Into<String>, code: &'static str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            error: error.into(),
            code,
        }
    }

    fn internal(error: impl Into<String>, code: &'static str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
            code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub question: String,
}

/// Chat response body.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub question: String,
    pub answer: String,
    pub context_chunks: Vec<String>,
}

fn normalize_user(user: &str) -> Result<String, ApiError> {
    let user = user.trim().to_lowercase();
    if user.is_empty() {
        return Err(ApiError::bad_request("user must not be empty", "EMPTY_USER"));
    }
    Ok(user)
}

/// Answer one question, using the session's uploaded documents as context.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user = normalize_user(&request.user)?;
    // Forwarded verbatim; pasted code keeps its indentation.
    let question = request.question.as_str();
    if question.trim().is_empty() {
        return Err(ApiError::bad_request(
            "question must not be empty",
            "EMPTY_QUESTION",
        ));
    }

    let active = request
        .session_id
        .as_deref()
        .map(|id| state.sessions.active(id))
        .unwrap_or_default();

    info!(
        user = %user,
        active = active.len(),
        question_preview = %question.trim().chars().take(50).collect::<String>(),
        "Received question"
    );

    let turn = state.chat.chat(&user, question, &active).await;

    Ok(Json(ChatResponse {
        question: turn.question,
        answer: turn.answer,
        context_chunks: turn.context,
    }))
}

/// Document upload body.
#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub session_id: String,
    pub file_name: String,
    pub content: String,
}

/// Document upload response.
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub collection: String,
    pub chunks: usize,
    pub active_collections: Vec<String>,
}

/// Ingest a document and make it active for the session.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DocumentRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
    if request.session_id.trim().is_empty() {
        return Err(ApiError::bad_request(
            "session_id must not be empty",
            "EMPTY_SESSION",
        ));
    }

    let report = state
        .chat
        .retrieval()
        .ingestor()
        .ingest_text(&request.file_name, &request.content)
        .await
        .map_err(|e| match e {
            DevbotError::Ingest(msg) => {
                warn!(file = %request.file_name, error = %msg, "Document rejected");
                ApiError::bad_request(msg, "INGEST_REJECTED")
            }
            other => {
                error!(file = %request.file_name, error = %other, "Document ingestion failed");
                ApiError::internal(other.to_string(), "INGEST_FAILED")
            }
        })?;

    let active_collections = state
        .sessions
        .register(&request.session_id, &report.collection);

    info!(
        session = %request.session_id,
        collection = %report.collection,
        chunks = report.chunks,
        "Document uploaded"
    );

    Ok(Json(DocumentResponse {
        collection: report.collection,
        chunks: report.chunks,
        active_collections,
    }))
}

/// Session reset response.
#[derive(Debug, Serialize)]
pub struct SessionResetResponse {
    pub session_id: String,
    pub cleared_collections: Vec<String>,
}

/// Forget the session's uploaded documents.
///
/// The document collections stay in the store; later turns in the session
/// simply stop consulting them.
pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<SessionResetResponse> {
    let cleared_collections = state.sessions.clear(&session_id);
    info!(
        session = %session_id,
        cleared = cleared_collections.len(),
        "Session reset"
    );
    Json(SessionResetResponse {
        session_id,
        cleared_collections,
    })
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Recent exchanges for a user, oldest first.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    let user = normalize_user(&user)?;
    let records = state
        .chat
        .recent_history(&user, query.limit)
        .await
        .map_err(|e| {
            error!(user = %user, error = %e, "History lookup failed");
            ApiError::internal(e.to_string(), "HISTORY_ERROR")
        })?;
    Ok(Json(records))
}
