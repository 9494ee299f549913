//! API error types.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use stitch_coordinator::CoordinatorError;
use stitch_storage::StorageError;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Chunk indices still missing, for incomplete uploads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<u64>>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Multipart(_) => "invalid_multipart",
            Self::Storage(_) => "storage_error",
            Self::Coordinator(e) => match e {
                CoordinatorError::InvalidInput { .. } => "invalid_input",
                CoordinatorError::Body(_) => "body_read_failed",
                CoordinatorError::Incomplete { .. } => "incomplete_upload",
                CoordinatorError::UnexpectedChunks { .. } => "unexpected_chunks",
                CoordinatorError::EmptySession => "empty_session",
                CoordinatorError::Corruption { .. } => "corrupt_session",
                CoordinatorError::Store { .. } => "storage_error",
                CoordinatorError::NotFound(_) => "not_found",
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Coordinator(e) => match e {
                CoordinatorError::InvalidInput { .. } | CoordinatorError::Body(_) => {
                    StatusCode::BAD_REQUEST
                }
                CoordinatorError::Incomplete { .. } | CoordinatorError::UnexpectedChunks { .. } => {
                    StatusCode::CONFLICT
                }
                CoordinatorError::EmptySession | CoordinatorError::NotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                CoordinatorError::Corruption { .. } | CoordinatorError::Store { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Message safe to hand to clients. Server-side failures never carry
    /// store keys or backend detail.
    fn public_message(&self) -> String {
        match self {
            Self::Storage(_) => "storage backend unavailable".to_string(),
            Self::Coordinator(CoordinatorError::Corruption { .. }) => {
                "session storage is corrupt".to_string()
            }
            Self::Coordinator(e @ CoordinatorError::Store { op, .. }) if e.is_timeout() => {
                format!("store {op} timed out")
            }
            Self::Coordinator(CoordinatorError::Store { op, .. }) => format!("store {op} failed"),
            other => other.to_string(),
        }
    }

    fn missing(&self) -> Option<Vec<u64>> {
        match self {
            Self::Coordinator(CoordinatorError::Incomplete { missing }) => {
                Some(missing.iter().map(|index| index.get()).collect())
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            match &self {
                ApiError::Coordinator(CoordinatorError::Store { op, key, source }) => {
                    tracing::error!(op = %op, key = %key, error = %source, "Store operation failed");
                }
                ApiError::Coordinator(CoordinatorError::Corruption { key, reason }) => {
                    tracing::error!(key = %key, reason = %reason, "Corrupt chunk key under session prefix");
                }
                other => tracing::error!(error = %other, "Request failed"),
            }
        }

        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.public_message(),
            missing: self.missing(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
