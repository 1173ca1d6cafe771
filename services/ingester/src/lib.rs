//! Weather IPFS gateway service library.
//!
//! HTTP surface over the ingestion pipeline: telemetry ingestion by content
//! hash, latest-reading queries, the Chainlink external adapter, manual IPNS
//! republishing, and status/health/metrics endpoints.

pub mod chainlink;
pub mod config;
pub mod error;
pub mod server;
pub mod tracker;
