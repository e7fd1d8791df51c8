//! API request and response types

use crate::llm::ChatMessage;
use serde::{Deserialize, Serialize};

/// Request body for `POST /api/chat`. Either `messages` (fresh user turn) or
/// `previous_response_id` + `tool_outputs` (continuation after client-side
/// tool execution) must be present.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub previous_response_id: Option<String>,
    #[serde(default)]
    pub tool_outputs: Vec<ToolOutputPayload>,
}

/// One client-executed tool result.
#[derive(Debug, Deserialize)]
pub struct ToolOutputPayload {
    pub call_id: String,
    pub output: String,
}

/// Response for draft resolution actions
#[derive(Debug, Serialize)]
pub struct DraftActionResponse {
    pub draft_id: String,
    pub description: String,
    pub resolved_now: bool,
    pub state: crate::draft::DraftState,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
