//! Draft mutations (two-phase user-mediated commit)
//!
//! Some operations are not committed on first invocation: the handler builds
//! a draft holding the would-be delta, the UI surfaces it, and the real
//! mutation runs only when the user confirms. A draft resolves exactly once;
//! duplicate confirm/discard calls (stale UI events) are no-ops, not errors.

use crate::store::{Delta, DeltaSynchronizer, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Resolution state of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftState {
    Pending,
    Confirmed,
    Discarded,
}

/// A proposed but unexecuted change.
pub struct DraftMutation {
    pub id: String,
    pub user_id: String,
    /// Human-readable preview shown on the confirmation card.
    pub description: String,
    pub created_at: DateTime<Utc>,
    delta: Delta,
    state: Mutex<DraftState>,
}

impl DraftMutation {
    pub fn new(user_id: impl Into<String>, description: impl Into<String>, delta: Delta) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            description: description.into(),
            created_at: Utc::now(),
            delta,
            state: Mutex::new(DraftState::Pending),
        }
    }

    pub fn state(&self) -> DraftState {
        *self.state.lock().unwrap()
    }

    /// Execute the real mutation. Returns true if it ran now, false if the
    /// draft was already resolved. An infrastructure failure leaves the draft
    /// pending so the user can retry.
    pub fn confirm(&self, sync: &DeltaSynchronizer) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        if *state != DraftState::Pending {
            return Ok(false);
        }
        sync.apply(&self.user_id, self.delta.clone())?;
        *state = DraftState::Confirmed;
        Ok(true)
    }

    /// Drop the draft without executing it. Returns true if this call
    /// resolved it.
    pub fn discard(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != DraftState::Pending {
            return false;
        }
        *state = DraftState::Discarded;
        true
    }
}

/// Registry of drafts awaiting resolution from the UI layer.
#[derive(Default)]
pub struct DraftStore {
    drafts: Mutex<HashMap<String, Arc<DraftMutation>>>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, draft: DraftMutation) -> Arc<DraftMutation> {
        let draft = Arc::new(draft);
        self.drafts
            .lock()
            .unwrap()
            .insert(draft.id.clone(), draft.clone());
        draft
    }

    pub fn get(&self, id: &str) -> Option<Arc<DraftMutation>> {
        self.drafts.lock().unwrap().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntityKind, EntityRef};
    use crate::store::{DeltaLog, OverlayStore, RemoteError, RemoteStore};
    use async_trait::async_trait;
    use serde_json::{json, Value};

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

    fn synchronizer() -> DeltaSynchronizer {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        DeltaSynchronizer::new(
            Arc::new(OverlayStore::new()),
            DeltaLog::open_in_memory().unwrap(),
            Arc::new(NullRemote),
            tx,
        )
    }

    fn message_draft() -> DraftMutation {
        let delta = Delta::new(EntityRef::new(EntityKind::Message, "m1"))
            .with_field("body", json!("See you at the gym"))
            .with_field("recipient_id", json!("u2"));
        DraftMutation::new("u1", "Message to u2", delta)
    }

    #[test]
    fn confirm_twice_persists_exactly_once() {
        let sync = synchronizer();
        let draft = message_draft();

        assert!(draft.confirm(&sync).unwrap());
        assert!(!draft.confirm(&sync).unwrap());
        assert_eq!(sync.overlay().pending_len(), 1);
        assert_eq!(draft.state(), DraftState::Confirmed);
    }

    #[test]
    fn confirm_after_discard_is_a_no_op() {
        let sync = synchronizer();
        let draft = message_draft();

        assert!(draft.discard());
        assert!(!draft.confirm(&sync).unwrap());
        assert_eq!(sync.overlay().pending_len(), 0);
        assert_eq!(draft.state(), DraftState::Discarded);
    }

    #[test]
    fn discard_after_confirm_is_a_no_op() {
        let sync = synchronizer();
        let draft = message_draft();

        assert!(draft.confirm(&sync).unwrap());
        assert!(!draft.discard());
        assert_eq!(draft.state(), DraftState::Confirmed);
    }
}
