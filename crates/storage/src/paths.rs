//! MFS layout for telemetry records.
//!
//! ```text
//! /weather/{geohash}/{YYYYMMDD_HHmmssSSS}.json   one per ingestion, never overwritten
//! /weather/{geohash}/latest.json                 most recent ingestion
//! ```

use chrono::{DateTime, Utc};

/// Default MFS root folder.
pub const DEFAULT_ROOT: &str = "/weather";

/// Name of the per-geohash latest pointer.
pub const LATEST_FILE: &str = "latest.json";

/// Sortable file name for a record timestamp (UTC).
pub fn record_file_name(timestamp: &DateTime<Utc>) -> String {
    format!("{}.json", timestamp.format("%Y%m%d_%H%M%S%3f"))
}

/// Location of one geohash's records in the namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePath {
    root: String,
    geohash: String,
}

impl NamespacePath {
    pub fn new(root: &str, geohash: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            root: if root.is_empty() { "/".to_string() } else { root.to_string() },
            geohash: geohash.to_string(),
        }
    }

    pub fn geohash(&self) -> &str {
        &self.geohash
    }

    /// Directory holding the geohash's records.
    pub fn directory(&self) -> String {
        if self.root == "/" {
            format!("/{}", self.geohash)
        } else {
            format!("{}/{}", self.root, self.geohash)
        }
    }

    /// Permanent file for a record.
    pub fn record_file(&self, timestamp: &DateTime<Utc>) -> String {
        format!("{}/{}", self.directory(), record_file_name(timestamp))
    }

    /// The latest pointer.
    pub fn latest(&self) -> String {
        format!("{}/{}", self.directory(), LATEST_FILE)
    }
}
