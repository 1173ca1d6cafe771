//! HTTP error responses.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use tracing::{error, warn};

use weather_common::WeatherError;

/// Method and path of the request being served, for error bodies.
#[derive(Debug, Clone)]
pub struct RequestLine {
    pub method: Method,
    pub path: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestLine {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
        })
    }
}

impl RequestLine {
    pub fn fail(&self, err: WeatherError) -> ApiError {
        ApiError::new(
            StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            err.to_string(),
            self,
        )
    }
}

/// Uniform error body: `{"error": ..., "message": "Could not GET /path"}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// An error response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, request: &RequestLine) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                message: format!("Could not {} {}", request.method, request.path),
            },
        }
    }

    pub fn not_found(request: &RequestLine) -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found", request)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), error = %self.body.error, "{}", self.body.message);
        } else {
            warn!(status = self.status.as_u16(), error = %self.body.error, "{}", self.body.message);
        }
        (self.status, Json(self.body)).into_response()
    }
}
