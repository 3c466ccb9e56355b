//! Service-specific error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Per-request failures of the management API.
///
/// Each variant renders as a JSON body `{"error": ...}` with the status from
/// [`ApiError::status`].
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid API key")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Pool(#[from] hailuo_pool::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pool(hailuo_pool::Error::EmptyPool) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Pool(hailuo_pool::Error::Persistence(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "error": self.to_string() }).to_string(),
        )
            .into_response()
    }
}
