//! Stream event parser
//!
//! Reconstructs whole text segments and whole tool calls from the model's
//! chunked event feed. The transport delivers newline-delimited records where
//! an optional `event:` record names the type of the following `data:` record;
//! a bare `data:` record defaults to type `message`. Read boundaries carry no
//! meaning: a chunk may end mid-line or mid-UTF-8 sequence, so the decoder
//! buffers the incomplete tail across feeds.
//!
//! Tool-call arguments arrive fragmented. Fragments accumulate keyed by call
//! id and a call is sealed only by the explicit done record; a turn that ends
//! with unsealed calls is a protocol violation and the calls are dropped,
//! never guessed-complete.

use super::types::{StreamEvent, ToolCall};
use serde_json::Value;
use std::collections::HashMap;

const DEFAULT_EVENT_TYPE: &str = "message";

/// One `event:`/`data:` record pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseRecord {
    pub event_type: String,
    pub data: String,
}

/// Line-level decoder for the SSE transport framing.
#[derive(Default)]
pub struct SseLineDecoder {
    /// Unterminated tail bytes from the previous chunk.
    buffer: Vec<u8>,
    /// Type annotation for the next data record, if an `event:` line was seen.
    pending_type: Option<String>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one transport chunk, returning every record it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline).collect();
            // Only complete lines are decoded, so a chunk boundary inside a
            // multi-byte character never corrupts text.
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(record) = self.handle_line(line) {
                records.push(record);
            }
        }
        records
    }

    fn handle_line(&mut self, line: &str) -> Option<SseRecord> {
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        if let Some(event_type) = line.strip_prefix("event:") {
            self.pending_type = Some(event_type.trim().to_string());
            return None;
        }
        if let Some(data) = line.strip_prefix("data:") {
            // The annotation applies to exactly one data record.
            let event_type = self
                .pending_type
                .take()
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string());
            return Some(SseRecord {
                event_type,
                data: data.trim_start().to_string(),
            });
        }
        tracing::debug!(line = %line, "Ignoring unrecognized stream line");
        None
    }
}

struct PartialToolCall {
    name: String,
    fragments: String,
}

/// Parses the record stream into typed events. Finite per turn; a new turn
/// needs a new parser.
#[derive(Default)]
pub struct StreamEventParser {
    decoder: SseLineDecoder,
    partial_calls: HashMap<String, PartialToolCall>,
    sealed_ids: Vec<String>,
}

impl StreamEventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one transport chunk, returning the events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let records = self.decoder.feed(chunk);
        let mut events = Vec::new();
        for record in records {
            events.extend(self.handle_record(&record));
        }
        events
    }

    /// Ids of tool calls that were started but never sealed.
    pub fn unsealed_call_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.partial_calls.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn handle_record(&mut self, record: &SseRecord) -> Option<StreamEvent> {
        let data: Value = match serde_json::from_str(&record.data) {
            Ok(value) => value,
            Err(e) => {
                // Malformed payloads are skipped, not fatal to the turn.
                tracing::warn!(
                    event_type = %record.event_type,
                    error = %e,
                    "Skipping malformed stream record"
                );
                return None;
            }
        };

        match record.event_type.as_str() {
            "turn_started" => Some(StreamEvent::TurnStarted),
            "text_delta" => {
                let delta = data.get("delta").and_then(Value::as_str).unwrap_or("");
                Some(StreamEvent::TextDelta {
                    delta: delta.to_string(),
                })
            }
            "tool_call_started" => self.on_call_started(&data),
            "tool_call_delta" => self.on_call_delta(&data),
            "tool_call_done" => self.on_call_done(&data),
            "turn_completed" => self.on_turn_completed(&data),
            "error" => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("stream error");
                Some(StreamEvent::StreamError {
                    message: message.to_string(),
                })
            }
            other => Some(StreamEvent::Custom {
                event_type: other.to_string(),
                data,
            }),
        }
    }

    fn on_call_started(&mut self, data: &Value) -> Option<StreamEvent> {
        let call_id = data.get("call_id").and_then(Value::as_str)?.to_string();
        let name = data
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if self.partial_calls.contains_key(&call_id) || self.sealed_ids.contains(&call_id) {
            return Some(StreamEvent::StreamError {
                message: format!("duplicate tool call id {call_id}"),
            });
        }

        self.partial_calls.insert(
            call_id.clone(),
            PartialToolCall {
                name: name.clone(),
                fragments: String::new(),
            },
        );
        Some(StreamEvent::ToolCallStarted { call_id, name })
    }

    fn on_call_delta(&mut self, data: &Value) -> Option<StreamEvent> {
        let call_id = data.get("call_id").and_then(Value::as_str)?;
        let delta = data.get("delta").and_then(Value::as_str).unwrap_or("");

        let Some(partial) = self.partial_calls.get_mut(call_id) else {
            tracing::warn!(call_id = %call_id, "Argument fragment for unknown tool call");
            return None;
        };
        partial.fragments.push_str(delta);
        Some(StreamEvent::ToolCallDelta {
            call_id: call_id.to_string(),
            delta: delta.to_string(),
        })
    }

    fn on_call_done(&mut self, data: &Value) -> Option<StreamEvent> {
        let call_id = data.get("call_id").and_then(Value::as_str)?;

        let Some(partial) = self.partial_calls.remove(call_id) else {
            tracing::warn!(call_id = %call_id, "Done record for unknown tool call");
            return None;
        };

        // The done record may carry the full argument text; it wins over the
        // accumulated fragments when present.
        let arguments = data
            .get("arguments")
            .and_then(Value::as_str)
            .map_or(partial.fragments, String::from);

        self.sealed_ids.push(call_id.to_string());
        Some(StreamEvent::ToolCallCompleted {
            call: ToolCall {
                id: call_id.to_string(),
                name: partial.name,
                arguments,
            },
        })
    }

    fn on_turn_completed(&mut self, data: &Value) -> Option<StreamEvent> {
        if !self.partial_calls.is_empty() {
            let dropped = self.unsealed_call_ids();
            self.partial_calls.clear();
            tracing::warn!(
                call_ids = ?dropped,
                "Turn completed with unsealed tool calls, dropping them"
            );
            return Some(StreamEvent::StreamError {
                message: format!("turn ended with unsealed tool calls: {}", dropped.join(", ")),
            });
        }

        let response_id = data
            .get("response_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Some(StreamEvent::TurnCompleted {
            response_id: response_id.to_string(),
        })
    }
}
