//! Remote document store client
//!
//! The remote store is eventually-consistent backing truth: get-by-id and
//! put-whole-document on user-scoped paths, no transactions. Writes are
//! forwarded best-effort by the outbox worker; a failed put is logged and
//! retried, never surfaced to the turn that produced it.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote store unreachable: {0}")]
    Network(String),
    #[error("remote store rejected request: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Network faults are worth retrying; rejections are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Network(_))
    }
}

/// Document-level access to the remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a document by its user-scoped path. `None` when absent.
    async fn get_document(&self, path: &str) -> Result<Option<Value>, RemoteError>;

    /// Replace a whole document at its user-scoped path.
    async fn put_document(&self, path: &str, doc: &Value) -> Result<(), RemoteError>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn get_document(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        (**self).get_document(path).await
    }

    async fn put_document(&self, path: &str, doc: &Value) -> Result<(), RemoteError> {
        (**self).put_document(path, doc).await
    }
}

/// HTTP-backed remote store.
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn get_document(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(RemoteError::Rejected(format!(
                "GET {path}: HTTP {}",
                response.status()
            )));
        }

        let doc = response
            .json()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(Some(doc))
    }

    async fn put_document(&self, path: &str, doc: &Value) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.url(path))
            .json(doc)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteError::Rejected(format!(
                "PUT {path}: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}
