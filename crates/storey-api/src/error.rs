//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping internal errors to appropriate HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use storey_chat::ChatError;
use storey_core::error::StoreyError;

/// Message returned in place of internal error details.
const INTERNAL_MESSAGE: &str = "An internal error occurred.";

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 500 Internal Server Error. The detail is logged, never returned.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Internal(detail) => {
                error!(detail = %detail, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    INTERNAL_MESSAGE.to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage | ChatError::MessageTooLong(_) | ChatError::InvalidSessionId(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ChatError::SessionNotFound(_) => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StoreyError> for ApiError {
    fn from(err: StoreyError) -> Self {
        match err {
            StoreyError::NotFound(msg) => ApiError::NotFound(msg),
            StoreyError::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
