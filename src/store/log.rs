//! Durable delta log
//!
//! Every accepted delta is persisted here synchronously before the write is
//! reported successful. The same table doubles as the outbox: rows stay
//! unsynced until the remote store confirms them, so forwarding is durable,
//! retryable, and observable instead of fire-and-forget.

use super::delta::Delta;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("delta log error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("delta encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type LogResult<T> = Result<T, LogError>;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS delta_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    entity_kind TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    synced_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_delta_log_unsynced ON delta_log(seq) WHERE synced_at IS NULL;
";

/// Thread-safe handle to the sqlite-backed delta log.
#[derive(Clone)]
pub struct DeltaLog {
    conn: Arc<Mutex<Connection>>,
}

impl DeltaLog {
    /// Open or create the log at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> LogResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory log for tests.
    pub fn open_in_memory() -> LogResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> LogResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Append a delta, assigning its log sequence number. Duplicate delivery
    /// of the same delta id returns the previously assigned seq.
    pub fn append(&self, user_id: &str, delta: &mut Delta) -> LogResult<()> {
        let conn = self.conn.lock().unwrap();
        let payload = serde_json::to_string(delta)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO delta_log (id, user_id, entity_kind, entity_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                delta.id,
                user_id,
                delta.entity.kind.path_segment(),
                delta.entity.id,
                payload,
                Utc::now().to_rfc3339(),
            ],
        )?;

        let seq: i64 = if inserted > 0 {
            conn.last_insert_rowid()
        } else {
            conn.query_row(
                "SELECT seq FROM delta_log WHERE id = ?1",
                params![delta.id],
                |row| row.get(0),
            )?
        };
        delta.seq = seq;

        // The payload column carries the assigned seq so replays merge in the
        // same order.
        let payload = serde_json::to_string(delta)?;
        conn.execute(
            "UPDATE delta_log SET payload = ?1 WHERE id = ?2",
            params![payload, delta.id],
        )?;
        Ok(())
    }

    /// Unsynced deltas in append order, with their owning user.
    pub fn load_unsynced(&self, limit: usize) -> LogResult<Vec<(String, Delta)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, payload FROM delta_log WHERE synced_at IS NULL ORDER BY seq LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (user_id, payload) = row?;
            out.push((user_id, serde_json::from_str(&payload)?));
        }
        Ok(out)
    }

    /// Mark a delta confirmed by the remote store.
    pub fn mark_synced(&self, delta_id: &str) -> LogResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE delta_log SET synced_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), delta_id],
        )?;
        Ok(())
    }

    /// Count of unsynced rows (observability).
    pub fn unsynced_len(&self) -> LogResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM delta_log WHERE synced_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
