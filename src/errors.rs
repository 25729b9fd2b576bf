use crate::services::storage_service::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::fmt;

/// HTTP-facing error: a status, a human readable message and optional details.
///
/// Serialized as `{"error": message}` or `{"error": message, "details": ...}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<Value>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: None,
        }
    }

    /// Attach a `details` payload to the response body.
    pub fn with_details(mut self, details: impl Into<Value>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 403 Forbidden
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.message, "details": details }),
            None => json!({ "error": self.message }),
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. } => {
                AppError::not_found(err.to_string())
            }
            StorageError::InvalidBucketName { .. }
            | StorageError::UnsupportedRegion(_)
            | StorageError::InvalidObjectKey => AppError::bad_request(err.to_string()),
            StorageError::PreconditionFailed { .. } => {
                AppError::new(StatusCode::PRECONDITION_FAILED, err.to_string())
            }
            StorageError::PayloadMissing { .. } | StorageError::Sqlx(_) | StorageError::Io(_) => {
                tracing::error!("storage failure: {}", err);
                AppError::internal("internal storage error")
            }
        }
    }
}
