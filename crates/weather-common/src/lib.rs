//! Common types and utilities shared across the weather-ipfs crates.
//!
//! - [`hash`]: content hash acceptance check
//! - [`telemetry`]: defensive decoding of upstream telemetry payloads
//! - [`reading`]: projection of telemetry into the public weather schema
//! - [`error`]: the error taxonomy and its HTTP mapping

pub mod error;
pub mod hash;
pub mod reading;
pub mod telemetry;

pub use error::{NormalizationError, WeatherError, WeatherResult};
pub use hash::{is_valid, ContentHash, HASH_LENGTH};
pub use reading::{project, WeatherReading};
pub use telemetry::{normalize, normalize_bytes, validate_geohash, RawPayload, TelemetryRecord};
