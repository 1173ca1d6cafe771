//! IPFS RPC client implementing [`ContentStore`].

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::store::{ContentStore, PublishOptions, PublishedName, StoreError, StoreResult};

/// Configuration for the IPFS node connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpfsConfig {
    /// RPC API base URL (port 5001 on a stock node)
    pub url: String,
    /// Timeout for every call except `name/publish`
    pub timeout_secs: u64,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5001".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Error body of the RPC API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatResponse {
    hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PublishResponse {
    name: String,
    value: String,
}

/// HTTP client for a single IPFS node.
#[derive(Debug, Clone)]
pub struct IpfsClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl IpfsClient {
    /// Create a new client from config.
    pub fn new(config: &IpfsConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| StoreError::Request {
                op: "connect",
                target: config.url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn rpc(
        &self,
        op: &'static str,
        target: &str,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> StoreResult<Bytes> {
        let url = format!("{}/api/v0/{}", self.base_url, op);

        let mut request = self.client.post(&url).query(query);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let request_error = |source| StoreError::Request {
            op,
            target: target.to_string(),
            source,
        };

        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(request_error)?;

        if status.is_success() {
            debug!(op, size = body.len(), "RPC call succeeded");
            Ok(body)
        } else {
            Err(classify_error(op, target, status.as_u16(), &body))
        }
    }
}

/// Map an RPC error body onto the store error kinds the pipeline branches on.
fn classify_error(op: &'static str, target: &str, status: u16, body: &[u8]) -> StoreError {
    let message = serde_json::from_slice::<ApiErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());

    let lower = message.to_lowercase();
    if lower.contains("does not exist") || lower.contains("not found") || lower.contains("no link named") {
        StoreError::NotFound(target.to_string())
    } else if lower.contains("already has entry") || lower.contains("already exists") {
        StoreError::AlreadyExists(target.to_string())
    } else {
        StoreError::Api {
            op,
            target: target.to_string(),
            status,
            message,
        }
    }
}

#[async_trait]
impl ContentStore for IpfsClient {
    #[instrument(skip(self), fields(path = %path))]
    async fn stat(&self, path: &str) -> StoreResult<String> {
        let body = self
            .rpc("files/stat", path, &[("arg", path)], Some(self.timeout))
            .await?;

        let stat: StatResponse = serde_json::from_slice(&body)
            .map_err(|e| StoreError::Decode(format!("files/stat {}: {}", path, e)))?;
        Ok(stat.hash)
    }

    #[instrument(skip(self), fields(hash = %hash))]
    async fn cat(&self, hash: &str) -> StoreResult<Bytes> {
        self.rpc("cat", hash, &[("arg", hash)], Some(self.timeout)).await
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn mkdir(&self, path: &str) -> StoreResult<()> {
        self.rpc(
            "files/mkdir",
            path,
            &[("arg", path), ("parents", "true")],
            Some(self.timeout),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(hash = %hash, dest = %dest))]
    async fn cp(&self, hash: &str, dest: &str) -> StoreResult<()> {
        let source = format!("/ipfs/{}", hash);
        self.rpc(
            "files/cp",
            dest,
            &[("arg", source.as_str()), ("arg", dest)],
            Some(self.timeout),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn rm(&self, path: &str) -> StoreResult<()> {
        self.rpc("files/rm", path, &[("arg", path)], Some(self.timeout))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn read(&self, path: &str) -> StoreResult<Bytes> {
        self.rpc("files/read", path, &[("arg", path)], Some(self.timeout))
            .await
    }

    #[instrument(skip(self, options), fields(hash = %hash, lifetime = %options.lifetime))]
    async fn publish(&self, hash: &str, options: &PublishOptions) -> StoreResult<PublishedName> {
        let allow_offline = options.allow_offline.to_string();
        let mut query = vec![
            ("arg", hash),
            ("lifetime", options.lifetime.as_str()),
            ("allow-offline", allow_offline.as_str()),
        ];
        if let Some(key) = &options.key {
            query.push(("key", key.as_str()));
        }

        // Publishing can take minutes; the caller owns the deadline.
        let body = self.rpc("name/publish", hash, &query, None).await?;

        let published: PublishResponse = serde_json::from_slice(&body)
            .map_err(|e| StoreError::Decode(format!("name/publish {}: {}", hash, e)))?;
        Ok(PublishedName {
            name: published.name,
            value: published.value,
        })
    }
}
