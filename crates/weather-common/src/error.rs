//! Error types for weather-ipfs services.

use thiserror::Error;

/// Result type alias using WeatherError.
pub type WeatherResult<T> = Result<T, WeatherError>;

/// Reasons a raw payload could not be turned into a telemetry record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("Invalid data: payload is not valid JSON ({0})")]
    InvalidJson(String),

    #[error("Invalid data: payload is not object-like ({0})")]
    NotObjectLike(String),

    #[error("Invalid data: payload is an empty array")]
    EmptyArray,

    #[error("Data is not telemetry: required '{0}' field is missing")]
    MissingField(&'static str),

    #[error("Invalid geohash '{0}': expected a non-empty alphanumeric key")]
    InvalidGeohash(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Primary error type for ingestion and query operations.
#[derive(Debug, Error)]
pub enum WeatherError {
    // === Client Errors ===
    #[error("Invalid IPFS hash '{0}'. Must be exactly 46 characters")]
    InvalidHash(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error("Not found: {0}")]
    NotFound(String),

    // === Store Errors ===
    /// `target` is a content hash or an MFS path.
    #[error("Failed to fetch {target}: {message}")]
    Fetch { target: String, message: String },

    #[error("Failed to {op} {path}: {message}")]
    StoreWrite {
        op: &'static str,
        path: String,
        message: String,
    },

    #[error("Stored record at {path} is not valid telemetry: {source}")]
    InvalidStoredRecord {
        path: String,
        source: NormalizationError,
    },

    // === Infrastructure Errors ===
    #[error("Request timeout")]
    Timeout,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl WeatherError {
    /// Wrap a store failure raised while fetching a content hash or path.
    pub fn fetch(target: impl Into<String>, err: impl std::fmt::Display) -> Self {
        WeatherError::Fetch {
            target: target.into(),
            message: err.to_string(),
        }
    }

    /// Wrap a store failure raised while mutating a namespace path.
    pub fn store_write(op: &'static str, path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        WeatherError::StoreWrite {
            op,
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Error class name, used in logs, metrics labels and adapter responses.
    pub fn kind(&self) -> &'static str {
        match self {
            WeatherError::InvalidHash(_) | WeatherError::InvalidInput(_) => "InvalidInputError",
            WeatherError::Normalization(_) | WeatherError::InvalidStoredRecord { .. } => {
                "NormalizationError"
            }
            WeatherError::NotFound(_) => "NotFoundError",
            WeatherError::Fetch { .. } => "UpstreamFetchError",
            WeatherError::StoreWrite { .. } => "StoreWriteError",
            WeatherError::Timeout => "TimeoutError",
            WeatherError::Internal(_) => "InternalError",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            WeatherError::InvalidHash(_)
            | WeatherError::InvalidInput(_)
            | WeatherError::Normalization(_) => 400,

            WeatherError::NotFound(_) => 404,

            WeatherError::Timeout => 504,

            _ => 500,
        }
    }
}

impl From<serde_json::Error> for WeatherError {
    fn from(err: serde_json::Error) -> Self {
        WeatherError::Internal(format!("JSON error: {}", err))
    }
}
