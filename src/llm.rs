//! Model provider integration
//!
//! Outbound requests carry the full tool schema and either fresh messages or
//! a `previous_response_id` plus tool outputs (continuation). Responses are
//! consumed as a chunked event stream through `StreamEventParser`.

mod client;
mod error;
pub mod stream;
mod types;

#[cfg(test)]
mod proptests;

pub use client::{ModelClient, ModelStream, ResponsesClient};
pub use error::{LlmError, LlmErrorKind};
pub use stream::StreamEventParser;
pub use types::{
    ChatMessage, ChatRole, StreamEvent, ToolCall, ToolDefinition, ToolOutput, TurnRequest,
};
