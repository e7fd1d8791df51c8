//! Entity overlay store and delta reconciliation
//!
//! Entities live as base JSON snapshots plus an append-only log of pending
//! deltas. Reads fold the log into the snapshot on demand; writes go through
//! the `DeltaSynchronizer`, which is the single mutator.

mod delta;
mod log;
mod overlay;
mod remote;
mod sync;

#[cfg(test)]
mod proptests;

pub use delta::{fold, fold_all, Delta};
pub use log::{DeltaLog, LogError};
pub use overlay::OverlayStore;
pub use remote::{HttpRemoteStore, RemoteError, RemoteStore};
pub use sync::{DeltaSynchronizer, OutboxWorker, StoreError};
