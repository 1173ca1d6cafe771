//! Chainlink external adapter.
//!
//! A Chainlink node posts `{"id": <job run id>, "data": {"geohash": ...}}`
//! and expects the reading back wrapped with the job run id.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use weather_common::{WeatherError, WeatherReading};

use crate::error::{ApiError, RequestLine};

/// Successful adapter result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSuccess {
    #[serde(rename = "jobRunID")]
    pub job_run_id: Value,
    pub data: WeatherReading,
    pub status_code: u16,
}

/// Failed adapter result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterError {
    #[serde(rename = "jobRunID")]
    pub job_run_id: Value,
    pub status: &'static str,
    pub error: AdapterErrorDetail,
    pub status_code: u16,
}

#[derive(Debug, Serialize)]
pub struct AdapterErrorDetail {
    pub name: &'static str,
    pub message: String,
}

/// A validated adapter request.
#[derive(Debug, Clone)]
pub struct AdapterRequest {
    pub job_run_id: Value,
    pub data: Value,
}

impl AdapterRequest {
    /// Check the request envelope. Failures here are plain HTTP errors, not
    /// adapter results, since there is no job run to report against.
    pub fn parse(body: &[u8], request: &RequestLine) -> Result<Self, ApiError> {
        let mut body: Value = serde_json::from_slice(body).map_err(|e| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                format!("Request body is not valid JSON: {}", e),
                request,
            )
        })?;

        let job_run_id = match body.get_mut("id").map(Value::take) {
            Some(id) if !id.is_null() => id,
            _ => {
                return Err(ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "Required parameter 'id' is missing",
                    request,
                ))
            }
        };

        let data = match body.get_mut("data").map(Value::take) {
            Some(data) if !data.is_null() => data,
            _ => {
                return Err(ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "Required parameter 'data' is missing",
                    request,
                ))
            }
        };

        Ok(Self { job_run_id, data })
    }

    /// `data.geohash`, as an adapter error when absent.
    pub fn geohash(&self) -> Result<String, WeatherError> {
        match self.data.get("geohash") {
            Some(Value::String(geohash)) => Ok(geohash.clone()),
            Some(other) if !other.is_null() => Ok(other.to_string()),
            _ => Err(WeatherError::InvalidInput(
                "Required param 'data.geohash' is missing".to_string(),
            )),
        }
    }

    pub fn success(self, reading: WeatherReading) -> Response {
        (
            StatusCode::OK,
            Json(AdapterSuccess {
                job_run_id: self.job_run_id,
                data: reading,
                status_code: StatusCode::OK.as_u16(),
            }),
        )
            .into_response()
    }

    pub fn failure(self, err: &WeatherError) -> Response {
        let status = StatusCode::from_u16(err.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(AdapterError {
                job_run_id: self.job_run_id,
                status: "errored",
                error: AdapterErrorDetail {
                    name: err.kind(),
                    message: err.to_string(),
                },
                status_code: status.as_u16(),
            }),
        )
            .into_response()
    }
}
