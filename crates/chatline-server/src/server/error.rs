//! JSON error responses for the HTTP surface.

use axum::{http::StatusCode, Json};
use serde::Serialize;

use crate::config::Environment;

const GENERIC_INTERNAL_MESSAGE: &str = "An unexpected condition was encountered.";
const GENERIC_BAD_REQUEST_MESSAGE: &str = "The request cannot or will not be processed due to something that is perceived to be a client error (for example, validation error).";

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
}

/// HTTP-facing error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    InvalidInput(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> &str {
        match self {
            ApiError::NotFound(msg) | ApiError::InvalidInput(msg) | ApiError::Internal(msg) => msg,
        }
    }

    /// Render the error.
    ///
    /// Outside development, 400 and 500 responses carry a generic message
    /// instead of the detail.
    pub fn to_response(&self, environment: Environment) -> (StatusCode, Json<ErrorResponse>) {
        let status = self.status();
        let message = match (environment, status) {
            (Environment::Development, _) => self.detail().to_string(),
            (_, StatusCode::INTERNAL_SERVER_ERROR) => GENERIC_INTERNAL_MESSAGE.to_string(),
            (_, StatusCode::BAD_REQUEST) => GENERIC_BAD_REQUEST_MESSAGE.to_string(),
            _ => self.detail().to_string(),
        };

        (
            status,
            Json(ErrorResponse {
                status: status.as_u16(),
                message,
            }),
        )
    }
}
