//! Per-turn handler context

use crate::draft::DraftStore;
use crate::store::DeltaSynchronizer;
use serde_json::{json, Value};
use std::sync::Arc;

/// References to the entities most recently created or modified in this
/// conversation, so follow-up commands ("now change its protocol") resolve
/// without re-specifying ids.
#[derive(Debug, Clone, Default)]
pub struct LastRefs {
    pub workout_id: Option<String>,
    pub exercise_instance_id: Option<String>,
}

/// A UI side artifact queued by a handler, surfaced to the client once text
/// streaming finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum UiArtifact {
    WorkoutCard { workout: Value },
    SuggestionChips { chips: Vec<String> },
    DraftCard { draft_id: String, description: String },
}

impl UiArtifact {
    /// Event type under which the artifact is streamed to the client.
    pub fn event_type(&self) -> &'static str {
        match self {
            UiArtifact::WorkoutCard { .. } => "workout_card",
            UiArtifact::SuggestionChips { .. } => "suggestion_chips",
            UiArtifact::DraftCard { .. } => "message_draft",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            UiArtifact::WorkoutCard { workout } => json!({ "workout": workout }),
            UiArtifact::SuggestionChips { chips } => json!({ "chips": chips }),
            UiArtifact::DraftCard {
                draft_id,
                description,
            } => json!({ "draft_id": draft_id, "description": description }),
        }
    }
}

/// Per-turn scope passed to every handler: the authenticated actor, the
/// write path, the draft registry, last-entity references, and the pending
/// artifact queue.
pub struct ToolHandlerContext {
    pub user_id: String,
    pub sync: DeltaSynchronizer,
    pub drafts: Arc<DraftStore>,
    pub last_refs: LastRefs,
    artifacts: Vec<UiArtifact>,
}

impl ToolHandlerContext {
    pub fn new(user_id: impl Into<String>, sync: DeltaSynchronizer, drafts: Arc<DraftStore>) -> Self {
        Self {
            user_id: user_id.into(),
            sync,
            drafts,
            last_refs: LastRefs::default(),
            artifacts: Vec::new(),
        }
    }

    pub fn push_artifact(&mut self, artifact: UiArtifact) {
        self.artifacts.push(artifact);
    }

    /// Drain the queued artifacts for streaming.
    pub fn take_artifacts(&mut self) -> Vec<UiArtifact> {
        std::mem::take(&mut self.artifacts)
    }

    pub fn has_artifacts(&self) -> bool {
        !self.artifacts.is_empty()
    }
}
