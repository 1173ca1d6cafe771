//! The content store boundary.
//!
//! Everything the services need from the IPFS node goes through
//! [`ContentStore`], so the pipeline and the publish queue can run against
//! the HTTP client in production and an in-memory store in tests.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by a content store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{op} {target}: request failed: {source}")]
    Request {
        op: &'static str,
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{op} {target}: store returned {status}: {message}")]
    Api {
        op: &'static str,
        target: String,
        status: u16,
        message: String,
    },

    #[error("{0} does not exist")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Unexpected store response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Options for binding the mutable name to a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOptions {
    /// Record validity, in IPFS duration syntax (`8760h`).
    pub lifetime: String,
    /// Publish even when no naming peers are reachable.
    pub allow_offline: bool,
    /// Keypair name to publish under; the node's own key when unset.
    pub key: Option<String>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            lifetime: "8760h".to_string(),
            allow_offline: true,
            key: None,
        }
    }
}

/// Result of a successful name publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedName {
    /// The mutable name (`k51...`).
    pub name: String,
    /// The path it now resolves to (`/ipfs/Qm...`).
    pub value: String,
}

/// Primitive operations of the content-addressed store and its mutable
/// namespace.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Current content hash of a namespace path.
    async fn stat(&self, path: &str) -> StoreResult<String>;

    /// Raw bytes of a content-addressed object.
    async fn cat(&self, hash: &str) -> StoreResult<Bytes>;

    /// Create a directory and any missing parents. Idempotent.
    async fn mkdir(&self, path: &str) -> StoreResult<()>;

    /// Link the object `hash` at namespace path `dest`.
    async fn cp(&self, hash: &str, dest: &str) -> StoreResult<()>;

    /// Remove a namespace path.
    async fn rm(&self, path: &str) -> StoreResult<()>;

    /// Bytes of the file at a namespace path.
    async fn read(&self, path: &str) -> StoreResult<Bytes>;

    /// Bind the mutable name to `hash`.
    async fn publish(&self, hash: &str, options: &PublishOptions) -> StoreResult<PublishedName>;
}
