//! Wire types for model turns

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[allow(dead_code)] // Constructor for API completeness
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    #[allow(dead_code)] // Constructor for API completeness
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Tool schema advertised to the model. The parameter contract is declarative
/// configuration supplied by each handler.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A sealed tool invocation requested by the model. Immutable once the
/// parser has seen the arguments-done record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw argument text exactly as streamed; parsed lazily by handlers.
    pub arguments: String,
}

impl ToolCall {
    /// Parse the raw arguments, falling back to an empty object on malformed
    /// text so handlers validate fields instead of crashing on syntax.
    pub fn parsed_arguments(&self) -> Value {
        serde_json::from_str(&self.arguments).unwrap_or_else(|e| {
            tracing::warn!(call_id = %self.id, error = %e, "Malformed tool arguments, treating as empty");
            Value::Object(serde_json::Map::new())
        })
    }
}

/// The textual result a handler produced for one tool call. Exactly one per
/// ToolCall per turn; submitted back to the model to continue generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub call_id: String,
    pub output: String,
}

impl ToolOutput {
    pub fn new(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
        }
    }
}

/// One request to the model provider: fresh messages, or a continuation
/// carrying tool outputs against a previous response.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub messages: Vec<ChatMessage>,
    pub previous_response_id: Option<String>,
    pub tool_outputs: Vec<ToolOutput>,
    pub tools: Vec<ToolDefinition>,
}

impl TurnRequest {
    pub fn fresh(messages: Vec<ChatMessage>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            messages,
            tools,
            ..Self::default()
        }
    }

    pub fn continuation(
        previous_response_id: impl Into<String>,
        tool_outputs: Vec<ToolOutput>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            previous_response_id: Some(previous_response_id.into()),
            tool_outputs,
            tools,
            ..Self::default()
        }
    }
}

/// Typed events reconstructed from the chunked model stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TurnStarted,
    TextDelta {
        delta: String,
    },
    ToolCallStarted {
        call_id: String,
        name: String,
    },
    ToolCallDelta {
        call_id: String,
        delta: String,
    },
    /// A sealed tool call; only ever emitted after the arguments-done record.
    ToolCallCompleted {
        call: ToolCall,
    },
    TurnCompleted {
        response_id: String,
    },
    /// Custom or unrecognized event types, passed through untouched so
    /// clients can treat them as inert.
    Custom {
        event_type: String,
        data: Value,
    },
    /// Protocol violation or transport fault; the turn cannot continue.
    StreamError {
        message: String,
    },
}
