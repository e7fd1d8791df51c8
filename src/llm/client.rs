//! Model provider client
//!
//! Posts one turn request and returns the raw byte stream for the parser.
//! Error classification mirrors the provider's status codes so the
//! orchestrator can distinguish retryable faults from hard failures.

use super::error::LlmError;
use super::types::{ChatRole, TurnRequest};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

/// Chunked response bytes; boundaries are transport artifacts, not records.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, LlmError>> + Send>>;

/// Seam for the model provider, mockable in tests.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Start one model turn and return its event byte stream.
    async fn start_turn(&self, request: &TurnRequest) -> Result<ModelStream, LlmError>;
}

/// HTTP client for the hosted responses endpoint.
pub struct ResponsesClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl ResponsesClient {
    pub fn new(endpoint: impl Into<String>, api_key: String, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            api_key,
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }

    fn translate_request(&self, request: &TurnRequest) -> WireRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                content: m.content.clone(),
            })
            .collect();

        let tool_outputs = request
            .tool_outputs
            .iter()
            .map(|o| WireToolOutput {
                call_id: o.call_id.clone(),
                output: o.output.clone(),
            })
            .collect();

        let tools = request
            .tools
            .iter()
            .map(|t| WireTool {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect();

        WireRequest {
            model: self.model.clone(),
            messages,
            previous_response_id: request.previous_response_id.clone(),
            tool_outputs,
            tools,
            stream: true,
        }
    }
}

#[async_trait]
impl ModelClient for ResponsesClient {
    async fn start_turn(&self, request: &TurnRequest) -> Result<ModelStream, LlmError> {
        let wire_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::timeout(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<WireErrorResponse>(&body)
                .map_or(body, |e| e.error.message);
            return Err(match status.as_u16() {
                401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
                429 => LlmError::rate_limit(format!("Rate limit exceeded: {message}")),
                400 => LlmError::invalid_request(format!("Invalid request: {message}")),
                500..=599 => LlmError::server_error(format!("Server error: {message}")),
                _ => LlmError::unknown(format!("HTTP {status}: {message}")),
            });
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| LlmError::network(format!("Stream read failed: {e}")))
        });
        Ok(Box::pin(stream))
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_response_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_outputs: Vec<WireToolOutput>,
    tools: Vec<WireTool>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireToolOutput {
    call_id: String,
    output: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}
