//! Delta synchronizer and outbox worker
//!
//! `DeltaSynchronizer` is the one write path into the overlay: fold the delta
//! into the in-memory snapshot, persist it to the durable log in the same
//! call, and nudge the outbox. A durable-log failure rolls the overlay back to
//! its exact pre-attempt state and fails the mutation; a remote failure later
//! is logged by the worker and never rolled back.

use super::delta::Delta;
use super::log::{DeltaLog, LogError};
use super::overlay::OverlayStore;
use super::remote::{RemoteError, RemoteStore};
use crate::domain::EntityRef;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

const OUTBOX_BATCH: usize = 32;
const OUTBOX_POLL: Duration = Duration::from_secs(5);
const MAX_BACKOFF_SHIFT: u32 = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("durable log unavailable: {0}")]
    Durable(#[from] LogError),
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Durable(_) => false,
            StoreError::Remote(e) => e.is_retryable(),
        }
    }
}

/// The single mutator for the overlay store.
#[derive(Clone)]
pub struct DeltaSynchronizer {
    overlay: Arc<OverlayStore>,
    log: DeltaLog,
    remote: Arc<dyn RemoteStore>,
    nudge: mpsc::Sender<()>,
}

impl DeltaSynchronizer {
    pub fn new(
        overlay: Arc<OverlayStore>,
        log: DeltaLog,
        remote: Arc<dyn RemoteStore>,
        nudge: mpsc::Sender<()>,
    ) -> Self {
        Self {
            overlay,
            log,
            remote,
            nudge,
        }
    }

    pub fn overlay(&self) -> &Arc<OverlayStore> {
        &self.overlay
    }

    /// Accept one mutation: optimistic fold, synchronous durable persist,
    /// best-effort forward via the outbox. Returns the delta with its log
    /// sequence assigned.
    pub fn apply(&self, user_id: &str, delta: Delta) -> Result<Delta, StoreError> {
        let mut delta = delta;
        self.overlay.apply(delta.clone());

        if let Err(e) = self.log.append(user_id, &mut delta) {
            // Exact rollback: the optimistic copy is removed, views recompute
            // without it.
            self.overlay.remove(&delta.id);
            tracing::error!(delta_id = %delta.id, error = %e, "Durable persist failed, rolled back");
            return Err(e.into());
        }

        // Replace the optimistic copy with the seq-assigned one so merge
        // order matches the durable log on replay.
        self.overlay.remove(&delta.id);
        self.overlay.apply(delta.clone());

        // Wake the outbox worker; a full channel means it is already awake.
        let _ = self.nudge.try_send(());
        Ok(delta)
    }

    /// Make sure an entity's base snapshot is loaded, fetching it from the
    /// remote store on first access. Handler read path; bounded by the remote
    /// client's timeout.
    pub async fn ensure_loaded(&self, user_id: &str, entity: &EntityRef) -> Result<(), StoreError> {
        if self.overlay.effective_view(entity).is_some() {
            return Ok(());
        }
        let path = entity.document_path(user_id);
        if let Some(doc) = self.remote.get_document(&path).await? {
            self.overlay.set_base(entity.clone(), doc);
        }
        Ok(())
    }
}

/// Background worker draining the durable outbox to the remote store.
pub struct OutboxWorker {
    overlay: Arc<OverlayStore>,
    log: DeltaLog,
    remote: Arc<dyn RemoteStore>,
    nudge: mpsc::Receiver<()>,
    /// Synced deltas whose compaction was deferred behind an older pending one.
    deferred_compactions: Vec<String>,
    consecutive_failures: u32,
}

impl OutboxWorker {
    pub fn new(
        overlay: Arc<OverlayStore>,
        log: DeltaLog,
        remote: Arc<dyn RemoteStore>,
        nudge: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            overlay,
            log,
            remote,
            nudge,
            deferred_compactions: Vec::new(),
            consecutive_failures: 0,
        }
    }

    pub async fn run(mut self) {
        loop {
            let wait = if self.consecutive_failures > 0 {
                backoff_delay(self.consecutive_failures)
            } else {
                OUTBOX_POLL
            };
            tokio::select! {
                nudged = self.nudge.recv() => {
                    if nudged.is_none() {
                        tracing::info!("Outbox channel closed, worker stopping");
                        break;
                    }
                }
                () = tokio::time::sleep(wait) => {}
            }
            self.drain().await;
        }
    }

    /// Forward unsynced deltas in log order. Stops the batch on a retryable
    /// failure so the next round retries from the same head.
    pub async fn drain(&mut self) {
        let batch = match self.log.load_unsynced(OUTBOX_BATCH) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(error = %e, "Outbox could not read the delta log");
                return;
            }
        };

        for (user_id, delta) in batch {
            let path = delta.entity.document_path(&user_id);
            let Some(doc) = self.overlay.effective_view(&delta.entity) else {
                tracing::warn!(delta_id = %delta.id, entity = %delta.entity, "No view for outbox delta, skipping");
                continue;
            };

            match self.remote.put_document(&path, &doc).await {
                Ok(()) => {
                    self.consecutive_failures = 0;
                    if let Err(e) = self.log.mark_synced(&delta.id) {
                        tracing::error!(delta_id = %delta.id, error = %e, "Failed to mark delta synced");
                        continue;
                    }
                    if !self.overlay.compact(&delta.id) {
                        self.deferred_compactions.push(delta.id.clone());
                    }
                }
                Err(e) if e.is_retryable() => {
                    self.consecutive_failures += 1;
                    tracing::warn!(
                        delta_id = %delta.id,
                        path = %path,
                        failures = self.consecutive_failures,
                        error = %e,
                        "Remote forward failed, will retry"
                    );
                    break;
                }
                Err(e) => {
                    // A rejection will not succeed on retry. The local commit
                    // stands; the failure is recorded loudly, never silently.
                    self.consecutive_failures = 0;
                    tracing::error!(delta_id = %delta.id, path = %path, error = %e, "Remote rejected delta, keeping local state");
                    if let Err(mark_err) = self.log.mark_synced(&delta.id) {
                        tracing::error!(delta_id = %delta.id, error = %mark_err, "Failed to retire rejected delta");
                    }
                }
            }
        }

        self.retry_deferred_compactions();
        tracing::debug!(
            pending = self.overlay.pending_len(),
            unsynced = self.log.unsynced_len().unwrap_or(0),
            "Outbox drain complete"
        );
    }

    fn retry_deferred_compactions(&mut self) {
        let deferred = std::mem::take(&mut self.deferred_compactions);
        for id in deferred {
            if !self.overlay.compact(&id) {
                self.deferred_compactions.push(id);
            }
        }
    }
}

fn backoff_delay(failures: u32) -> Duration {
    Duration::from_secs(1_u64 << failures.min(MAX_BACKOFF_SHIFT))
}
