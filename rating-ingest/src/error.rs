//! Error types for rating-ingest

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::commit::CommitError;
use crate::parser::ParseError;
use crate::staging::StagingError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or unrecognized caller identity (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Role lacks the required capability (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upload rejected as a whole (422, or 413 when over the size limit)
    #[error("Unprocessable upload: {0}")]
    Unprocessable(#[from] ParseError),

    /// Database could not be reached at all (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// rating-common error
    #[error("Common error: {0}")]
    Common(#[from] rating_common::Error),
}

impl From<StagingError> for ApiError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::Corrupt(detail) => ApiError::Internal(format!("staged data unreadable: {}", detail)),
            // Every other staging miss tells the user to upload again
            other => ApiError::Conflict(other.to_string()),
        }
    }
}

impl From<CommitError> for ApiError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::Unavailable(detail) => ApiError::Unavailable(detail),
        }
    }
}

impl From<rating_common::api::AccessDenied> for ApiError {
    fn from(err: rating_common::api::AccessDenied) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut details: Option<Value> = None;

        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unprocessable(err) => {
                let status = match &err {
                    ParseError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => StatusCode::UNPROCESSABLE_ENTITY,
                };
                let code = match &err {
                    ParseError::Empty => "EMPTY_FILE",
                    ParseError::TooLarge { .. } => "TOO_LARGE",
                    ParseError::Undecodable => "UNDECODABLE",
                    ParseError::MissingColumns(columns) => {
                        details = Some(json!({ "missing_columns": columns }));
                        "MISSING_COLUMNS"
                    }
                    ParseError::Malformed { line, .. } => {
                        details = Some(json!({ "line": line }));
                        "MALFORMED"
                    }
                };
                (status, code, err.to_string())
            }
            ApiError::Unavailable(msg) => {
                error!(error = %msg, "Database unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "UNAVAILABLE",
                    "database unavailable, please retry".to_string(),
                )
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            ApiError::Other(ref err) => {
                error!(error = %err, "Unhandled error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", err.to_string())
            }
            ApiError::Common(ref err) => {
                error!(error = %err, "Common error");
                (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR", err.to_string())
            }
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let (Some(details), Some(object)) = (details, error.as_object_mut()) {
            object.insert("details".to_string(), details);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
