//! Request-level errors and their HTTP responses.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Failure of a single-shot request.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing, undecodable or empty frame.
    #[error("{0}")]
    BadRequest(String),
    #[error("Analyzer unavailable: {0}")]
    Unavailable(String),
    #[error("Analysis failed: {0}")]
    Analysis(String),
    #[error("Analysis timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Analysis(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Single-frame request failed: {self}");
        } else {
            log::warn!("Single-frame request rejected: {self}");
        }
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
