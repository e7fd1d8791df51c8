//! Pure turn transition function
//!
//! Given the current state and one event, produce the next state and the
//! effects to execute. No I/O happens here; the driver owns all of it.

use super::state::{TurnEffect, TurnEvent, TurnState};
use crate::llm::StreamEvent;

/// Result of a state transition.
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<TurnEffect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: TurnEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Pure transition function. Events that make no sense in the current state
/// leave it unchanged; the driver logs them.
pub fn transition(state: &TurnState, event: TurnEvent) -> TransitionResult {
    match (state, event) {
        // ============================================================
        // Supersession and failure apply to every non-terminal state
        // ============================================================
        (s, TurnEvent::Superseded) if !s.is_terminal() => {
            TransitionResult::new(TurnState::Superseded)
        }

        (s, TurnEvent::ProgressTimeout) if !s.is_terminal() => {
            let reason = "no stream progress within the timeout".to_string();
            TransitionResult::new(TurnState::Failed {
                reason: reason.clone(),
            })
            .with_effect(TurnEffect::Forward(StreamEvent::StreamError {
                message: reason,
            }))
        }

        (s, TurnEvent::Stream(StreamEvent::StreamError { message })) if !s.is_terminal() => {
            TransitionResult::new(TurnState::Failed {
                reason: message.clone(),
            })
            .with_effect(TurnEffect::Forward(StreamEvent::StreamError { message }))
        }

        (s, TurnEvent::DispatchFailed { message }) if !s.is_terminal() => {
            TransitionResult::new(TurnState::Failed {
                reason: message.clone(),
            })
            .with_effect(TurnEffect::Forward(StreamEvent::StreamError { message }))
        }

        // ============================================================
        // Stream lifecycle
        // ============================================================
        (TurnState::Idle | TurnState::Resubmitting, TurnEvent::StreamOpened) => {
            TransitionResult::new(TurnState::Streaming)
        }

        // ============================================================
        // Streaming: text and tool-call assembly
        // ============================================================
        (TurnState::Streaming, TurnEvent::Stream(StreamEvent::ToolCallCompleted { call })) => {
            let forward = TurnEffect::Forward(StreamEvent::ToolCallCompleted { call: call.clone() });
            TransitionResult::new(TurnState::CollectingToolCalls {
                pending: vec![call],
            })
            .with_effect(forward)
        }

        (
            TurnState::CollectingToolCalls { pending },
            TurnEvent::Stream(StreamEvent::ToolCallCompleted { call }),
        ) => {
            let mut pending = pending.clone();
            pending.push(call.clone());
            TransitionResult::new(TurnState::CollectingToolCalls { pending })
                .with_effect(TurnEffect::Forward(StreamEvent::ToolCallCompleted { call }))
        }

        // Turn end with no pending calls: the turn is done. Artifacts flush
        // once text streaming finishes, before the completion event.
        (TurnState::Streaming, TurnEvent::Stream(StreamEvent::TurnCompleted { response_id })) => {
            TransitionResult::new(TurnState::Completed {
                response_id: response_id.clone(),
            })
            .with_effect(TurnEffect::FlushArtifacts)
            .with_effect(TurnEffect::Forward(StreamEvent::TurnCompleted {
                response_id,
            }))
        }

        // Turn end with pending calls: the batch is sealed, dispatch it.
        (
            TurnState::CollectingToolCalls { pending },
            TurnEvent::Stream(StreamEvent::TurnCompleted { response_id }),
        ) => {
            let calls = pending.clone();
            TransitionResult::new(TurnState::Dispatching {
                calls: calls.clone(),
                response_id,
            })
            .with_effect(TurnEffect::DispatchBatch { calls })
        }

        // Everything else streamed while collecting is forwarded as-is.
        (
            TurnState::Streaming | TurnState::CollectingToolCalls { .. },
            TurnEvent::Stream(event),
        ) => TransitionResult::new(state.clone()).with_effect(TurnEffect::Forward(event)),

        // ============================================================
        // Dispatch and continuation
        // ============================================================
        (
            TurnState::Dispatching { calls, response_id },
            TurnEvent::BatchDispatched { outputs },
        ) => {
            // Exactly one output per call; anything else would stall or
            // corrupt the continuation.
            if outputs.len() != calls.len() {
                let reason = format!(
                    "tool batch produced {} outputs for {} calls",
                    outputs.len(),
                    calls.len()
                );
                return TransitionResult::new(TurnState::Failed {
                    reason: reason.clone(),
                })
                .with_effect(TurnEffect::Forward(StreamEvent::StreamError {
                    message: reason,
                }));
            }
            TransitionResult::new(TurnState::Resubmitting).with_effect(TurnEffect::Resubmit {
                previous_response_id: response_id.clone(),
                outputs,
            })
        }

        // Anything else is a stale or out-of-order event; ignore it.
        (state, _) => TransitionResult::new(state.clone()),
    }
}
