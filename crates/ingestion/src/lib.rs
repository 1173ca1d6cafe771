//! Weather telemetry ingestion library.
//!
//! Provides the logic behind the `ingester` service:
//!
//! - [`IngestionPipeline`]: validate a content hash, fetch and normalize the
//!   telemetry, file it under `/weather/{geohash}/` and queue an IPNS publish
//! - [`WeatherQuery`]: serve the latest reading for a geohash and raw objects
//! - [`with_deadline`]: request-scoped deadlines that stop waiting without
//!   cancelling the store work underneath

mod deadline;
mod ingester;
mod query;

// Re-exports
pub use deadline::with_deadline;
pub use ingester::{IngestOutcome, IngestionPipeline, PipelineConfig};
pub use query::WeatherQuery;
