//! Read side: latest readings and raw objects.

use bytes::Bytes;
use metrics::counter;
use std::sync::Arc;
use tracing::instrument;

use storage::{ContentStore, NamespacePath, StoreError};
use weather_common::{
    normalize_bytes, project, validate_geohash, ContentHash, WeatherError, WeatherReading,
    WeatherResult,
};

/// Queries against the weather namespace.
#[derive(Clone)]
pub struct WeatherQuery {
    store: Arc<dyn ContentStore>,
    root: String,
}

impl WeatherQuery {
    pub fn new(store: Arc<dyn ContentStore>, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    /// Latest reading for a geohash, projected for display.
    #[instrument(skip(self))]
    pub async fn latest(&self, geohash: &str) -> WeatherResult<WeatherReading> {
        counter!("query_requests_total").increment(1);

        validate_geohash(geohash).map_err(|e| WeatherError::InvalidInput(e.to_string()))?;
        let path = NamespacePath::new(&self.root, geohash).latest();

        let bytes = match self.store.read(&path).await {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => {
                return Err(WeatherError::NotFound(format!(
                    "no readings for geohash {}",
                    geohash
                )))
            }
            Err(e) => return Err(WeatherError::fetch(&path, e)),
        };

        let record = normalize_bytes(&bytes)
            .map_err(|source| WeatherError::InvalidStoredRecord { path, source })?;

        Ok(project(&record))
    }

    /// Raw bytes of a content-addressed object.
    #[instrument(skip(self))]
    pub async fn object(&self, hash: &str) -> WeatherResult<Bytes> {
        let hash = ContentHash::parse(hash)?;

        self.store.cat(hash.as_str()).await.map_err(|e| match e {
            StoreError::NotFound(_) => WeatherError::NotFound(format!("object {}", hash)),
            other => WeatherError::fetch(hash.as_str(), other),
        })
    }
}
