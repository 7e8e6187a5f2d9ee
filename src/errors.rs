//! Share error types.
//!
//! Every variant maps to an HTTP status and a short machine-readable code.
//! The enum implements [`axum::response::IntoResponse`] so handlers can
//! simply return `Err(ShareError::Unauthorized)`.
//!
//! Backend failures keep their cause for logging; the client only sees the
//! generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors surfaced by the share engine and HTTP layer.
#[derive(Debug, Error)]
pub enum ShareError {
    /// The object path is unsafe or malformed.
    #[error("invalid path")]
    InvalidPath { path: String },

    /// The requested expiry is not in the future or exceeds policy.
    #[error("{message}")]
    InvalidExpiry { message: String },

    /// The request body or link is malformed.
    #[error("{message}")]
    InvalidRequest { message: String },

    /// The object (or route) does not exist.
    #[error("not found")]
    NotFound { path: String },

    /// Missing or mismatched secret.
    #[error("unauthorized")]
    Unauthorized,

    /// The link's embedded date has passed.
    #[error("link expired")]
    Expired,

    /// The route exists but not for this method.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// The handler did not finish within `server.request_timeout`.
    #[error("request timed out")]
    RequestTimeout,

    /// Storing the share secret failed.
    #[error("failed to create share")]
    CacheWriteFailed(#[source] anyhow::Error),

    /// Reading the share secret failed.
    #[error("failed to validate share")]
    CacheReadFailed(#[source] anyhow::Error),

    /// The object store failed.
    #[error("failed to fetch object")]
    ObjectFetchFailed(#[source] anyhow::Error),
}

/// JSON error body: `{error, code, message}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: String,
    /// HTTP status code.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
}

impl ShareError {
    /// Return the machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ShareError::InvalidPath { .. } => "invalid_path",
            ShareError::InvalidExpiry { .. } => "invalid_expiry",
            ShareError::InvalidRequest { .. } => "invalid_request",
            ShareError::NotFound { .. } => "not_found",
            ShareError::Unauthorized => "unauthorized",
            ShareError::Expired => "expired",
            ShareError::MethodNotAllowed => "method_not_allowed",
            ShareError::RequestTimeout => "request_timeout",
            ShareError::CacheWriteFailed(_) => "cache_write_failed",
            ShareError::CacheReadFailed(_) => "cache_read_failed",
            ShareError::ObjectFetchFailed(_) => "object_fetch_failed",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ShareError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            ShareError::InvalidExpiry { .. } => StatusCode::BAD_REQUEST,
            ShareError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ShareError::NotFound { .. } => StatusCode::NOT_FOUND,
            ShareError::Unauthorized => StatusCode::UNAUTHORIZED,
            ShareError::Expired => StatusCode::FORBIDDEN,
            ShareError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ShareError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            ShareError::CacheWriteFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ShareError::CacheReadFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ShareError::ObjectFetchFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The body sent to the client.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.code().to_string(),
            code: self.status_code().as_u16(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for ShareError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            // {:#} prints the whole anyhow context chain.
            match &self {
                ShareError::CacheWriteFailed(cause)
                | ShareError::CacheReadFailed(cause)
                | ShareError::ObjectFetchFailed(cause) => {
                    error!(code = self.code(), "{self}: {cause:#}");
                }
                _ => error!(code = self.code(), "{self}"),
            }
        }
        (status, Json(self.body())).into_response()
    }
}
