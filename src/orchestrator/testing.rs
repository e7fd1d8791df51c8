//! Mock model client and end-to-end turn scenario tests

use super::{Orchestrator, OutboundEvent, TurnState};
use crate::draft::DraftStore;
use crate::llm::{LlmError, ModelClient, ModelStream, TurnRequest};
use crate::store::{
    DeltaLog, DeltaSynchronizer, OverlayStore, RemoteError, RemoteStore,
};
use crate::tools::HandlerRegistry;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

struct NullRemote;

#[async_trait]
impl RemoteStore for NullRemote {
    async fn get_document(&self, _path: &str) -> Result<Option<Value>, RemoteError> {
        Ok(None)
    }
    async fn put_document(&self, _path: &str, _doc: &Value) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// One scripted model turn: a fixed chunk sequence, or a channel the test
/// feeds by hand.
enum MockTurn {
    Script(Vec<String>),
    Channel(mpsc::Receiver<Vec<u8>>),
}

/// Model client running from a script, recording every request it receives.
struct MockModelClient {
    turns: Mutex<VecDeque<MockTurn>>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl MockModelClient {
    fn new(turns: Vec<MockTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn start_turn(&self, request: &TurnRequest) -> Result<ModelStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::unknown("no scripted turn left"))?;
        Ok(match turn {
            MockTurn::Script(chunks) => Box::pin(futures::stream::iter(
                chunks
                    .into_iter()
                    .map(|c| Ok::<_, LlmError>(c.into_bytes())),
            )),
            MockTurn::Channel(rx) => Box::pin(futures::StreamExt::map(
                ReceiverStream::new(rx),
                Ok::<_, LlmError>,
            )),
        })
    }
}

fn record(event_type: &str, data: &str) -> String {
    format!("event: {event_type}\ndata: {data}\n\n")
}

fn tool_call(call_id: &str, name: &str, arguments: &str) -> String {
    let started = record(
        "tool_call_started",
        &format!("{{\"call_id\": \"{call_id}\", \"name\": \"{name}\"}}"),
    );
    let done = record(
        "tool_call_done",
        &serde_json::json!({ "call_id": call_id, "arguments": arguments }).to_string(),
    );
    format!("{started}{done}")
}

fn completed(response_id: &str) -> String {
    record(
        "turn_completed",
        &format!("{{\"response_id\": \"{response_id}\"}}"),
    )
}

fn orchestrator(model: Arc<MockModelClient>) -> Orchestrator {
    let (tx, _rx) = mpsc::channel(1);
    let sync = DeltaSynchronizer::new(
        Arc::new(OverlayStore::new()),
        DeltaLog::open_in_memory().unwrap(),
        Arc::new(NullRemote),
        tx,
    );
    Orchestrator::new(
        Arc::new(HandlerRegistry::standard()),
        model,
        sync,
        Arc::new(DraftStore::new()),
    )
    .with_progress_timeout(Duration::from_secs(5))
}

/// Run a turn and collect every outbound event.
async fn run_collecting(
    orch: &Orchestrator,
    request: TurnRequest,
) -> (TurnState, Vec<OutboundEvent>) {
    let (tx, mut rx) = mpsc::channel(64);
    let state = orch
        .run_turn("u1", request, tx, CancellationToken::new())
        .await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (state, events)
}

fn fresh_request() -> TurnRequest {
    TurnRequest::fresh(
        vec![crate::llm::ChatMessage::user("hello")],
        HandlerRegistry::standard().definitions(),
    )
}

#[tokio::test]
async fn plain_text_turn_completes() {
    let model = MockModelClient::new(vec![MockTurn::Script(vec![
        record("turn_started", "{}"),
        record("text_delta", "{\"delta\": \"Welcome \"}"),
        record("text_delta", "{\"delta\": \"back!\"}"),
        completed("r1"),
    ])]);
    let orch = orchestrator(model.clone());

    let (state, events) = run_collecting(&orch, fresh_request()).await;
    assert_eq!(
        state,
        TurnState::Completed {
            response_id: "r1".to_string()
        }
    );
    let text: String = events
        .iter()
        .filter(|e| e.event_type == "text_delta")
        .filter_map(|e| e.data["delta"].as_str().map(String::from))
        .collect();
    assert_eq!(text, "Welcome back!");
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn batched_calls_execute_only_and_submit_together() {
    // The model requests two tool calls before any text; both must run via
    // the batched shape and both outputs must go back in one submission.
    let model = MockModelClient::new(vec![
        MockTurn::Script(vec![
            record("turn_started", "{}"),
            tool_call("c1", "update_profile", "{\"bodyweight_kg\": 82.5}"),
            tool_call("c2", "show_schedule", "{}"),
            completed("r1"),
        ]),
        MockTurn::Script(vec![
            record("text_delta", "{\"delta\": \"All done.\"}"),
            completed("r2"),
        ]),
    ]);
    let orch = orchestrator(model.clone());

    let (state, _events) = run_collecting(&orch, fresh_request()).await;
    assert_eq!(
        state,
        TurnState::Completed {
            response_id: "r2".to_string()
        }
    );

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    // No ToolOutput was ever submitted alone.
    assert!(requests[0].tool_outputs.is_empty());
    assert_eq!(requests[1].tool_outputs.len(), 2);
    assert_eq!(requests[1].previous_response_id.as_deref(), Some("r1"));
    assert_eq!(requests[1].tool_outputs[0].call_id, "c1");
    assert_eq!(requests[1].tool_outputs[1].call_id, "c2");
    assert!(requests[1].tool_outputs[0].output.contains("bodyweight"));
}

#[tokio::test]
async fn unknown_tool_degrades_to_marked_output() {
    let model = MockModelClient::new(vec![
        MockTurn::Script(vec![
            tool_call("c1", "teleport_to_gym", "{}"),
            completed("r1"),
        ]),
        MockTurn::Script(vec![
            record("text_delta", "{\"delta\": \"Sorry.\"}"),
            completed("r2"),
        ]),
    ]);
    let orch = orchestrator(model.clone());

    let (state, _events) = run_collecting(&orch, fresh_request()).await;
    assert!(matches!(state, TurnState::Completed { .. }));

    let requests = model.requests();
    let output = &requests[1].tool_outputs[0];
    assert!(output.output.starts_with(crate::tools::FAILURE_MARKER));
    assert!(output.output.contains("teleport_to_gym"));
}

#[tokio::test]
async fn artifacts_flush_after_text_streaming_finishes() {
    let model = MockModelClient::new(vec![
        MockTurn::Script(vec![
            tool_call("c1", "show_schedule", "{}"),
            completed("r1"),
        ]),
        MockTurn::Script(vec![
            record("text_delta", "{\"delta\": \"Here is your week.\"}"),
            completed("r2"),
        ]),
    ]);
    let orch = orchestrator(model.clone());

    let (_state, events) = run_collecting(&orch, fresh_request()).await;
    let chips_at = events
        .iter()
        .position(|e| e.event_type == "suggestion_chips")
        .expect("schedule handler queues chips");
    let last_text = events
        .iter()
        .rposition(|e| e.event_type == "text_delta")
        .expect("continuation streams text");
    assert!(
        chips_at > last_text,
        "artifacts must flush after text streaming"
    );
}

#[tokio::test]
async fn superseded_turn_drops_late_tool_calls() {
    let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>(8);
    let model = MockModelClient::new(vec![MockTurn::Channel(chunk_rx)]);
    let orch = orchestrator(model.clone());

    let (tx, _rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let turn = tokio::spawn({
        let cancel = cancel.clone();
        let request = fresh_request();
        async move { orch.run_turn("u1", request, tx, cancel).await }
    });

    chunk_tx
        .send(record("text_delta", "{\"delta\": \"Thinking\"}").into_bytes())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The user sends a new message: the in-flight turn is superseded before
    // its tool call arrives.
    cancel.cancel();
    let _ = chunk_tx
        .send(tool_call("c9", "log_set", "{\"exercise\": \"squat\", \"reps\": 5}").into_bytes())
        .await;
    let _ = chunk_tx.send(completed("r1").into_bytes()).await;

    let state = turn.await.unwrap();
    assert_eq!(state, TurnState::Superseded);
    // The late tool call was never dispatched or resubmitted.
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn unsealed_tool_call_fails_the_turn() {
    let model = MockModelClient::new(vec![MockTurn::Script(vec![
        record(
            "tool_call_started",
            "{\"call_id\": \"c1\", \"name\": \"log_set\"}",
        ),
        record(
            "tool_call_delta",
            "{\"call_id\": \"c1\", \"delta\": \"{\\\"reps\\\"\"}",
        ),
        completed("r1"),
    ])]);
    let orch = orchestrator(model.clone());

    let (state, events) = run_collecting(&orch, fresh_request()).await;
    assert!(matches!(state, TurnState::Failed { .. }));
    assert!(events.iter().any(|e| e.event_type == "error"));
    // Never dispatched: only the initial request reached the model.
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn stalled_stream_times_out() {
    let (_chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>(1);
    let model = MockModelClient::new(vec![MockTurn::Channel(chunk_rx)]);
    let orch = orchestrator(model).with_progress_timeout(Duration::from_millis(50));

    let (state, events) = run_collecting(&orch, fresh_request()).await;
    assert!(matches!(state, TurnState::Failed { .. }));
    assert!(events.iter().any(|e| e.event_type == "error"));
}

#[tokio::test]
async fn last_refs_survive_into_the_next_turn() {
    // Turn 1 creates a workout; turn 2 completes "it" without naming one.
    let model = MockModelClient::new(vec![
        MockTurn::Script(vec![
            tool_call(
                "c1",
                "create_workout",
                "{\"title\": \"Lower A\", \"date\": \"2026-03-02\"}",
            ),
            completed("r1"),
        ]),
        MockTurn::Script(vec![
            record("text_delta", "{\"delta\": \"Created.\"}"),
            completed("r2"),
        ]),
        MockTurn::Script(vec![tool_call("c2", "complete_workout", "{}"), completed("r3")]),
        MockTurn::Script(vec![
            record("text_delta", "{\"delta\": \"Done.\"}"),
            completed("r4"),
        ]),
    ]);
    let orch = orchestrator(model.clone());

    let (first, _) = run_collecting(&orch, fresh_request()).await;
    assert!(matches!(first, TurnState::Completed { .. }));
    let (second, _) = run_collecting(&orch, fresh_request()).await;
    assert!(matches!(second, TurnState::Completed { .. }));

    let requests = model.requests();
    let output = &requests[3].tool_outputs[0];
    assert!(
        output.output.starts_with("Marked workout 'Lower A'"),
        "follow-up must resolve the last created workout, got: {}",
        output.output
    );
}

#[tokio::test]
async fn custom_events_pass_through_to_the_client() {
    let model = MockModelClient::new(vec![MockTurn::Script(vec![
        record("suggestion_chips", "{\"chips\": [\"Log a set\"]}"),
        record("text_delta", "{\"delta\": \"hi\"}"),
        completed("r1"),
    ])]);
    let orch = orchestrator(model);

    let (_state, events) = run_collecting(&orch, fresh_request()).await;
    assert!(events.iter().any(|e| e.event_type == "suggestion_chips"));
}
