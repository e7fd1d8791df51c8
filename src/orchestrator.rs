//! Conversation orchestrator
//!
//! Owns one turn of the protocol: forwards user input to the model, drives
//! the stream parser, dispatches sealed tool calls through the handler
//! registry, and resubmits tool outputs for continuation until the model
//! finishes. The state machine itself is pure (`transition`); this driver
//! executes its effects and owns every await point.

mod state;
mod transition;

#[cfg(test)]
mod testing;

pub use state::{OutboundEvent, TurnEffect, TurnEvent, TurnState};
pub use transition::{transition, TransitionResult};

use crate::draft::DraftStore;
use crate::llm::{
    ModelClient, StreamEvent, StreamEventParser, ToolCall, ToolOutput, TurnRequest,
};
use crate::store::{DeltaSynchronizer, StoreError};
use crate::tools::{HandlerRegistry, LastRefs, ToolHandlerContext};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEFAULT_PROGRESS_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Orchestrator {
    registry: Arc<HandlerRegistry>,
    model: Arc<dyn ModelClient>,
    sync: DeltaSynchronizer,
    drafts: Arc<DraftStore>,
    progress_timeout: Duration,
    /// Last created/modified entity references per user, carried across
    /// turns so follow-up commands resolve without re-specifying ids.
    last_refs: Mutex<HashMap<String, LastRefs>>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        model: Arc<dyn ModelClient>,
        sync: DeltaSynchronizer,
        drafts: Arc<DraftStore>,
    ) -> Self {
        Self {
            registry,
            model,
            sync,
            drafts,
            progress_timeout: DEFAULT_PROGRESS_TIMEOUT,
            last_refs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_progress_timeout(mut self, timeout: Duration) -> Self {
        self.progress_timeout = timeout;
        self
    }

    /// Tool schemas for building turn requests.
    pub fn tool_definitions(&self) -> Vec<crate::llm::ToolDefinition> {
        self.registry.definitions()
    }

    /// Run one turn to a terminal state, streaming outbound events to the
    /// client. `cancel` supersedes the turn: the old stream stops being
    /// consumed and pending tool calls are discarded, never resubmitted.
    pub async fn run_turn(
        &self,
        user_id: &str,
        initial: TurnRequest,
        events: mpsc::Sender<OutboundEvent>,
        cancel: CancellationToken,
    ) -> TurnState {
        let mut ctx = ToolHandlerContext::new(user_id, self.sync.clone(), self.drafts.clone());
        ctx.last_refs = self
            .last_refs
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        let mut state = TurnState::Idle;
        let mut parser = StreamEventParser::new();
        let mut queue: VecDeque<TurnEvent> = VecDeque::new();

        let mut stream = match self.model.start_turn(&initial).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, retryable = e.kind.is_retryable(), "Model request failed");
                let _ = events.send(OutboundEvent::error(e.to_string())).await;
                return TurnState::Failed {
                    reason: e.to_string(),
                };
            }
        };
        queue.push_back(TurnEvent::StreamOpened);

        loop {
            while let Some(event) = queue.pop_front() {
                let result = transition(&state, event);
                state = result.new_state;

                for effect in result.effects {
                    match effect {
                        TurnEffect::Forward(stream_event) => {
                            let _ = events.send(OutboundEvent::from_stream(&stream_event)).await;
                        }
                        TurnEffect::FlushArtifacts => {
                            for artifact in ctx.take_artifacts() {
                                let _ = events.send(OutboundEvent::from_artifact(&artifact)).await;
                            }
                        }
                        TurnEffect::DispatchBatch { calls } => {
                            if cancel.is_cancelled() {
                                queue.push_back(TurnEvent::Superseded);
                                continue;
                            }
                            match self.dispatch_batch(&calls, &mut ctx).await {
                                Ok(outputs) => {
                                    queue.push_back(TurnEvent::BatchDispatched { outputs });
                                }
                                Err(e) => {
                                    tracing::error!(error = %e, retryable = e.is_retryable(), "Tool dispatch hit an infrastructure fault");
                                    queue.push_back(TurnEvent::DispatchFailed {
                                        message: e.to_string(),
                                    });
                                }
                            }
                        }
                        TurnEffect::Resubmit {
                            previous_response_id,
                            outputs,
                        } => {
                            if cancel.is_cancelled() {
                                queue.push_back(TurnEvent::Superseded);
                                continue;
                            }
                            let request = TurnRequest::continuation(
                                previous_response_id,
                                outputs,
                                self.registry.definitions(),
                            );
                            match self.model.start_turn(&request).await {
                                Ok(new_stream) => {
                                    stream = new_stream;
                                    parser = StreamEventParser::new();
                                    queue.push_back(TurnEvent::StreamOpened);
                                }
                                Err(e) => {
                                    tracing::error!(error = %e, retryable = e.kind.is_retryable(), "Continuation request failed");
                                    queue.push_back(TurnEvent::Stream(StreamEvent::StreamError {
                                        message: e.to_string(),
                                    }));
                                }
                            }
                        }
                    }
                }
            }

            if state.is_terminal() {
                break;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!(user_id = %user_id, "Turn superseded by a newer message");
                    queue.push_back(TurnEvent::Superseded);
                }
                chunk = tokio::time::timeout(self.progress_timeout, futures::StreamExt::next(&mut stream)) => {
                    match chunk {
                        Err(_elapsed) => queue.push_back(TurnEvent::ProgressTimeout),
                        Ok(None) => queue.push_back(TurnEvent::Stream(StreamEvent::StreamError {
                            message: "transport disconnected before turn completion".to_string(),
                        })),
                        Ok(Some(Err(e))) => queue.push_back(TurnEvent::Stream(StreamEvent::StreamError {
                            message: e.to_string(),
                        })),
                        Ok(Some(Ok(bytes))) => {
                            for stream_event in parser.feed(&bytes) {
                                queue.push_back(TurnEvent::Stream(stream_event));
                            }
                        }
                    }
                }
            }
        }

        self.last_refs
            .lock()
            .unwrap()
            .insert(user_id.to_string(), ctx.last_refs.clone());

        tracing::info!(user_id = %user_id, state = ?state, "Turn finished");
        state
    }

    /// Execute every call of a batch, strictly sequentially. A single call
    /// takes the continuation shape; a real batch goes through execute-only
    /// so no partial result interleaves with model continuation.
    async fn dispatch_batch(
        &self,
        calls: &[ToolCall],
        ctx: &mut ToolHandlerContext,
    ) -> Result<Vec<ToolOutput>, StoreError> {
        let mut outputs = Vec::with_capacity(calls.len());
        if let [only] = calls {
            outputs.push(self.registry.dispatch(only, ctx).await?);
        } else {
            for call in calls {
                outputs.push(self.registry.execute_only_dispatch(call, ctx).await?);
            }
        }
        Ok(outputs)
    }
}
