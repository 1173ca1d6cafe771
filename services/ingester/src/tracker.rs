//! Tracking for ingestion requests, surfaced by `/status`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use ingestion::IngestOutcome;
use weather_common::WeatherError;

/// Tracking for ingestion operations.
pub struct IngestionTracker {
    active: Mutex<HashMap<String, ActiveIngestion>>,
    completed: Mutex<VecDeque<CompletedIngestion>>,
    max_completed: usize,
}

/// An ingestion in progress.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveIngestion {
    pub id: String,
    pub hash: String,
    pub started_at: DateTime<Utc>,
}

/// A finished ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedIngestion {
    pub id: String,
    pub hash: String,
    pub geohash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Snapshot of the tracker.
#[derive(Debug, Serialize)]
pub struct TrackerStatus {
    pub active: Vec<ActiveIngestion>,
    pub recent: Vec<CompletedIngestion>,
    pub total_completed: usize,
}

impl Default for IngestionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionTracker {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Tracker keeping at most `max_completed` finished ingestions.
    pub fn with_capacity(max_completed: usize) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            completed: Mutex::new(VecDeque::new()),
            max_completed,
        }
    }

    pub async fn start(&self, id: &str, hash: &str) {
        let ingestion = ActiveIngestion {
            id: id.to_string(),
            hash: hash.to_string(),
            started_at: Utc::now(),
        };
        self.active.lock().await.insert(id.to_string(), ingestion);
    }

    pub async fn complete(&self, id: &str, result: &Result<IngestOutcome, WeatherError>) {
        let Some(ingestion) = self.active.lock().await.remove(id) else {
            return;
        };

        let completed_at = Utc::now();
        let duration_ms = (completed_at - ingestion.started_at)
            .num_milliseconds()
            .max(0) as u64;

        let completed = CompletedIngestion {
            id: ingestion.id,
            hash: ingestion.hash,
            geohash: result.as_ref().ok().map(|o| o.geohash.clone()),
            started_at: ingestion.started_at,
            completed_at,
            duration_ms,
            success: result.is_ok(),
            error_message: result.as_ref().err().map(|e| e.to_string()),
        };

        let mut completed_list = self.completed.lock().await;
        completed_list.push_front(completed);

        // Keep only recent entries
        while completed_list.len() > self.max_completed {
            completed_list.pop_back();
        }
    }

    pub async fn get_status(&self) -> TrackerStatus {
        let active = self.active.lock().await.values().cloned().collect();
        let completed = self.completed.lock().await;

        TrackerStatus {
            active,
            recent: completed.iter().take(20).cloned().collect(),
            total_completed: completed.len(),
        }
    }
}
