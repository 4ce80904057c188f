//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors returned to API clients
///
/// Bodies are `{"error": "<message>"}`.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or wrong `key`; reported as not found
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid JSON provided.")]
    InvalidJson,

    #[error("Invalid data type provided")]
    InvalidDataType,

    #[error("{0}")]
    BadRequest(String),

    #[error("Snapshot unavailable: {0}")]
    Snapshot(#[from] ahsnap_common::AhsnapError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Unauthorized => StatusCode::NOT_FOUND,
            ApiError::InvalidJson | ApiError::InvalidDataType | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            },
            ApiError::Snapshot(ref e) => {
                tracing::error!("Snapshot error: {:?}", e);
                StatusCode::SERVICE_UNAVAILABLE
            },
            ApiError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                StatusCode::INTERNAL_SERVER_ERROR
            },
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
