//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{ChatRequest, DraftActionResponse, ErrorResponse};
use super::AppState;
use crate::llm::{ToolOutput, TurnRequest};
use crate::orchestrator::TurnState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/drafts/:id/confirm", post(confirm_draft))
        .route("/api/drafts/:id/discard", post(discard_draft))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ============================================================
// Chat
// ============================================================

/// The authenticated actor. Authentication itself happens upstream; this
/// layer only requires the identity header to be present.
fn actor(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| AppError::BadRequest("missing X-User-Id header".to_string()))
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let user_id = actor(&headers)?;

    let has_messages = !request.messages.is_empty();
    let has_outputs = !request.tool_outputs.is_empty();
    if has_messages == has_outputs {
        return Err(AppError::BadRequest(
            "provide either messages or tool_outputs".to_string(),
        ));
    }

    let tools = state.orchestrator.tool_definitions();
    let turn_request = if has_messages {
        // A fresh turn may still resume a prior response for context.
        let mut turn_request = TurnRequest::fresh(request.messages, tools);
        turn_request.previous_response_id = request.previous_response_id;
        turn_request
    } else {
        let Some(previous_response_id) = request.previous_response_id else {
            return Err(AppError::BadRequest(
                "tool_outputs require previous_response_id".to_string(),
            ));
        };
        let outputs = request
            .tool_outputs
            .into_iter()
            .map(|o| ToolOutput::new(o.call_id, o.output))
            .collect();
        TurnRequest::continuation(previous_response_id, outputs, tools)
    };

    // A new message supersedes any in-flight turn for this conversation.
    let cancel = state.begin_turn(&user_id);
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let outcome = orchestrator
            .run_turn(&user_id, turn_request, tx, cancel)
            .await;
        match &outcome {
            TurnState::Completed { response_id } => {
                tracing::debug!(user_id = %user_id, response_id = %response_id, "Turn completed");
            }
            TurnState::Failed { reason } => {
                tracing::warn!(user_id = %user_id, reason = %reason, "Turn failed");
            }
            _ => {}
        }
    });

    Ok(sse_stream(rx).into_response())
}

// ============================================================
// Draft resolution
// ============================================================

async fn confirm_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DraftActionResponse>, AppError> {
    let draft = state
        .drafts
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("unknown draft {id}")))?;

    let resolved_now = draft
        .confirm(&state.sync)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(DraftActionResponse {
        draft_id: id,
        description: draft.description.clone(),
        resolved_now,
        state: draft.state(),
        created_at: draft.created_at,
    }))
}

async fn discard_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DraftActionResponse>, AppError> {
    let draft = state
        .drafts
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("unknown draft {id}")))?;

    let resolved_now = draft.discard();
    Ok(Json(DraftActionResponse {
        draft_id: id,
        description: draft.description.clone(),
        resolved_now,
        state: draft.state(),
        created_at: draft.created_at,
    }))
}

// ============================================================
// Errors
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
