//! HTTP API
//!
//! `POST /api/chat` accepts either a fresh user turn (`messages`) or a
//! continuation (`previous_response_id` + `tool_outputs`) and answers with a
//! chunked SSE stream. Draft endpoints resolve pending two-phase mutations.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::draft::DraftStore;
use crate::orchestrator::Orchestrator;
use crate::store::DeltaSynchronizer;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub sync: DeltaSynchronizer,
    pub drafts: Arc<DraftStore>,
    /// One active turn per conversation: a new message cancels the old one.
    active_turns: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        sync: DeltaSynchronizer,
        drafts: Arc<DraftStore>,
    ) -> Self {
        Self {
            orchestrator,
            sync,
            drafts,
            active_turns: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Supersede any in-flight turn for the user and register a token for
    /// the new one.
    pub fn begin_turn(&self, user_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self
            .active_turns
            .lock()
            .unwrap()
            .insert(user_id.to_string(), token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        token
    }
}
