//! In-memory entity overlay
//!
//! Base snapshots plus the pending delta log. The effective view of an entity
//! is computed on every read by folding its pending deltas into its base
//! snapshot; no merged copy is ever stored. All mutation goes through the
//! `DeltaSynchronizer`; readers take a snapshot read and never block on it.

use super::delta::{fold, fold_all, Delta};
use crate::domain::{EntityKind, EntityRef};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    bases: HashMap<EntityRef, Value>,
    pending: Vec<Delta>,
}

/// Snapshot map and pending delta log behind a read/write lock.
#[derive(Default)]
pub struct OverlayStore {
    inner: RwLock<Inner>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the base snapshot for an entity.
    pub fn set_base(&self, entity: EntityRef, doc: Value) {
        let mut inner = self.inner.write().unwrap();
        inner.bases.insert(entity, doc);
    }

    /// Append a delta to the pending log and make it visible to the next read.
    pub fn apply(&self, delta: Delta) {
        let mut inner = self.inner.write().unwrap();
        inner.pending.push(delta);
    }

    /// Remove a pending delta, restoring the view to its pre-apply state.
    /// Returns the removed delta if it was still pending.
    pub fn remove(&self, delta_id: &str) -> Option<Delta> {
        let mut inner = self.inner.write().unwrap();
        let idx = inner.pending.iter().position(|d| d.id == delta_id)?;
        Some(inner.pending.remove(idx))
    }

    /// The effective view of an entity: base snapshot with all pending deltas
    /// folded in. `None` when the entity has neither a base nor any deltas.
    pub fn effective_view(&self, entity: &EntityRef) -> Option<Value> {
        let inner = self.inner.read().unwrap();
        let base = inner.bases.get(entity);
        let deltas: Vec<&Delta> = inner
            .pending
            .iter()
            .filter(|d| &d.entity == entity)
            .collect();
        if base.is_none() && deltas.is_empty() {
            return None;
        }
        Some(fold_all(base, deltas))
    }

    /// Effective views of every known entity of a kind.
    pub fn views_of_kind(&self, kind: EntityKind) -> Vec<(EntityRef, Value)> {
        let inner = self.inner.read().unwrap();
        let mut refs: Vec<EntityRef> = inner
            .bases
            .keys()
            .chain(inner.pending.iter().map(|d| &d.entity))
            .filter(|e| e.kind == kind)
            .cloned()
            .collect();
        refs.sort_by(|a, b| a.id.cmp(&b.id));
        refs.dedup();
        drop(inner);
        refs.into_iter()
            .filter_map(|entity| {
                let view = self.effective_view(&entity)?;
                Some((entity, view))
            })
            .collect()
    }

    /// Pending deltas for an entity, in merge order.
    #[allow(dead_code)] // Useful for tests
    pub fn pending_for(&self, entity: &EntityRef) -> Vec<Delta> {
        let inner = self.inner.read().unwrap();
        let mut deltas: Vec<Delta> = inner
            .pending
            .iter()
            .filter(|d| &d.entity == entity)
            .cloned()
            .collect();
        deltas.sort_by(|a, b| {
            (a.timestamp, a.seq, &a.id).cmp(&(b.timestamp, b.seq, &b.id))
        });
        deltas
    }

    /// Fold a remotely-confirmed delta into its entity's base snapshot and
    /// drop it from the pending log. Only the oldest pending delta of an
    /// entity may be compacted; compacting out of order would reorder the
    /// merge and change the view. Returns false when deferred.
    pub fn compact(&self, delta_id: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        let Some(idx) = inner.pending.iter().position(|d| d.id == delta_id) else {
            return false;
        };
        let entity = inner.pending[idx].entity.clone();

        let oldest = inner
            .pending
            .iter()
            .filter(|d| d.entity == entity)
            .min_by(|a, b| (a.timestamp, a.seq, &a.id).cmp(&(b.timestamp, b.seq, &b.id)))
            .map(|d| d.id.clone());
        if oldest.as_deref() != Some(delta_id) {
            return false;
        }

        let delta = inner.pending.remove(idx);
        let base = inner.bases.get(&entity).cloned().unwrap_or(Value::Null);
        inner.bases.insert(entity, fold(&base, &delta));
        true
    }

    /// Number of pending deltas (observability).
    pub fn pending_len(&self) -> usize {
        self.inner.read().unwrap().pending.len()
    }
}
