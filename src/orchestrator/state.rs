//! Turn state machine types

use crate::llm::{StreamEvent, ToolCall, ToolOutput};
use crate::tools::UiArtifact;
use serde_json::{json, Value};

/// States of one conversation turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TurnState {
    /// No active turn.
    #[default]
    Idle,

    /// Consuming parser events: appending text, waiting for tool calls.
    Streaming,

    /// At least one sealed tool call is pending; more may arrive before the
    /// model signals the end of the batch.
    CollectingToolCalls { pending: Vec<ToolCall> },

    /// Executing the batch, strictly sequentially.
    Dispatching {
        calls: Vec<ToolCall>,
        /// Response id the outputs will be submitted against.
        response_id: String,
    },

    /// Submitting all outputs of the batch together; the payload travels in
    /// the `Resubmit` effect.
    Resubmitting,

    /// Terminal: the model finished with no pending tool calls.
    Completed { response_id: String },

    /// Terminal: transport fault, protocol violation, or infrastructure
    /// failure. The client retries the whole turn.
    Failed { reason: String },

    /// Terminal: a newer user message took over the conversation. Pending
    /// tool calls were discarded, nothing was resubmitted.
    Superseded,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnState::Completed { .. } | TurnState::Failed { .. } | TurnState::Superseded
        )
    }
}

/// Events driving the turn state machine.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// A model stream was opened (initial request or continuation).
    StreamOpened,
    /// One parser event.
    Stream(StreamEvent),
    /// The driver finished executing a tool batch.
    BatchDispatched { outputs: Vec<ToolOutput> },
    /// A handler hit an infrastructure fault; the turn cannot continue.
    DispatchFailed { message: String },
    /// No stream progress within the bound.
    ProgressTimeout,
    /// A newer user message supersedes this turn.
    Superseded,
}

/// Effects the driver executes after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEffect {
    /// Forward a stream event to the client.
    Forward(StreamEvent),
    /// Execute every call of the batch, then report `BatchDispatched`.
    DispatchBatch { calls: Vec<ToolCall> },
    /// Submit all outputs together against the previous response.
    Resubmit {
        previous_response_id: String,
        outputs: Vec<ToolOutput>,
    },
    /// Surface queued UI artifacts now that text streaming is done.
    FlushArtifacts,
}

/// One client-facing event, encoded by the API layer as
/// `event: <type>\ndata: <json>\n\n`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    pub event_type: String,
    pub data: Value,
}

impl OutboundEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Encode a parser event in the client wire shape: `delta` for text,
    /// `call_id`/`name`/`arguments` at the top level for tool calls.
    pub fn from_stream(event: &StreamEvent) -> Self {
        match event {
            StreamEvent::TurnStarted => Self::new("turn_started", json!({})),
            StreamEvent::TextDelta { delta } => Self::new("text_delta", json!({ "delta": delta })),
            StreamEvent::ToolCallStarted { call_id, name } => Self::new(
                "tool_call_started",
                json!({ "call_id": call_id, "name": name }),
            ),
            StreamEvent::ToolCallDelta { call_id, delta } => Self::new(
                "tool_call_delta",
                json!({ "call_id": call_id, "delta": delta }),
            ),
            StreamEvent::ToolCallCompleted { call } => Self::new(
                "tool_call_done",
                json!({ "call_id": call.id, "name": call.name, "arguments": call.arguments }),
            ),
            StreamEvent::TurnCompleted { response_id } => Self::new(
                "turn_completed",
                json!({ "response_id": response_id }),
            ),
            StreamEvent::Custom { event_type, data } => {
                Self::new(event_type.clone(), data.clone())
            }
            StreamEvent::StreamError { message } => {
                Self::new("error", json!({ "message": message }))
            }
        }
    }

    pub fn from_artifact(artifact: &UiArtifact) -> Self {
        Self::new(artifact.event_type(), artifact.payload())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", json!({ "message": message.into() }))
    }
}
