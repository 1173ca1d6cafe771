//! Ingestion pipeline for published telemetry.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use storage::{
    ContentStore, NamespacePath, PublishJob, PublishQueue, StoreError, SubmitOutcome, DEFAULT_ROOT,
};
use weather_common::{normalize_bytes, ContentHash, WeatherError, WeatherResult};

use crate::deadline::with_deadline;

/// Attempts at swapping the latest pointer when another ingestion races us.
const LATEST_ATTEMPTS: usize = 3;

/// Options for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// MFS folder the geohash directories live under
    pub root: String,
    /// Deadline for one ingestion, publish excluded
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            request_timeout: Duration::from_secs(600),
        }
    }
}

/// Result of an ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub hash: ContentHash,
    pub geohash: String,
    pub timestamp: DateTime<Utc>,
    /// Permanent file written for this record
    pub record_path: String,
    pub latest_path: String,
    /// False when the latest pointer could not be replaced
    pub latest_updated: bool,
    /// The same hash was already filed under this timestamp
    pub already_recorded: bool,
    pub publish: SubmitOutcome,
}

/// Files content-addressed telemetry into the weather namespace.
///
/// Each ingestion fetches the object behind a hash, normalizes it, links it
/// at `{root}/{geohash}/{timestamp}.json` and `{root}/{geohash}/latest.json`,
/// then asks the [`PublishQueue`] to republish the root. The publish itself
/// happens in the background.
#[derive(Clone)]
pub struct IngestionPipeline {
    store: Arc<dyn ContentStore>,
    queue: PublishQueue,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn ContentStore>, queue: PublishQueue, config: PipelineConfig) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    pub fn root(&self) -> &str {
        &self.config.root
    }

    /// Ingest the telemetry object behind `hash`.
    ///
    /// The hash is checked before the store is touched. Past the deadline the
    /// caller gets [`WeatherError::Timeout`]; store calls already made are not
    /// rolled back.
    #[instrument(skip(self))]
    pub async fn ingest(&self, hash: &str) -> WeatherResult<IngestOutcome> {
        counter!("ingest_requests_total").increment(1);

        let result = match ContentHash::parse(hash) {
            Ok(hash) => {
                let pipeline = self.clone();
                with_deadline(self.config.request_timeout, async move {
                    pipeline.write_record(hash).await
                })
                .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            warn!(kind = e.kind(), error = %e, "Ingestion failed");
            counter!("ingest_failures_total", "kind" => e.kind()).increment(1);
        }
        result
    }

    async fn write_record(&self, hash: ContentHash) -> WeatherResult<IngestOutcome> {
        let bytes = self
            .store
            .cat(hash.as_str())
            .await
            .map_err(|e| WeatherError::fetch(hash.as_str(), e))?;

        let record = normalize_bytes(&bytes)?;
        debug!(
            geohash = %record.geohash,
            timestamp = %record.timestamp,
            "Normalized telemetry"
        );

        let location = NamespacePath::new(&self.config.root, &record.geohash);
        let directory = location.directory();
        let record_path = location.record_file(&record.timestamp);
        let latest_path = location.latest();

        self.store
            .mkdir(&directory)
            .await
            .map_err(|e| WeatherError::store_write("mkdir", &directory, e))?;

        info!(hash = %hash, path = %record_path, "Copying telemetry into namespace");
        let already_recorded = self.copy_record(&hash, &record_path).await?;

        let latest_updated = self.replace_latest(&hash, &latest_path).await;

        let publish = self
            .queue
            .submit(PublishJob::new(format!("ingest {}", hash)));

        info!(
            hash = %hash,
            geohash = %record.geohash,
            latest_updated,
            already_recorded,
            publish = ?publish,
            "Telemetry ingested"
        );

        Ok(IngestOutcome {
            hash,
            geohash: record.geohash,
            timestamp: record.timestamp,
            record_path,
            latest_path,
            latest_updated,
            already_recorded,
            publish,
        })
    }

    /// Point `latest.json` at `hash`. Returns false when the pointer could not
    /// be replaced.
    ///
    /// Removal and copy are separate store calls, so an overlapping ingestion
    /// for the same geohash can recreate the pointer in between. The swap is
    /// retried so the later writer ends up holding it.
    async fn replace_latest(&self, hash: &ContentHash, path: &str) -> bool {
        for attempt in 1..=LATEST_ATTEMPTS {
            // The pointer may not exist yet.
            if let Err(e) = self.store.rm(path).await {
                debug!(path, error = %e, "No latest pointer removed");
            }

            match self.store.cp(hash.as_str(), path).await {
                Ok(()) => return true,
                Err(StoreError::AlreadyExists(_)) if attempt < LATEST_ATTEMPTS => {
                    debug!(path, attempt, "Latest pointer recreated concurrently, retrying");
                }
                Err(e) => {
                    warn!(path, attempt, error = %e, "Failed to update latest pointer");
                    return false;
                }
            }
        }
        false
    }

    /// Link the record file. Returns true when it already held this hash.
    async fn copy_record(&self, hash: &ContentHash, path: &str) -> WeatherResult<bool> {
        match self.store.cp(hash.as_str(), path).await {
            Ok(()) => Ok(false),
            Err(StoreError::AlreadyExists(_)) => {
                let existing = self
                    .store
                    .stat(path)
                    .await
                    .map_err(|e| WeatherError::store_write("stat", path, e))?;

                if existing == hash.as_str() {
                    info!(hash = %hash, path, "Record already filed");
                    Ok(true)
                } else {
                    Err(WeatherError::store_write(
                        "cp",
                        path,
                        format!("already holds a different record ({})", existing),
                    ))
                }
            }
            Err(e) => Err(WeatherError::store_write("cp", path, e)),
        }
    }
}
