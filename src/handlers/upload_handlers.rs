//! `POST /api/uploads/presign`: the upload URL issuer over HTTP.

use crate::{
    errors::AppError,
    models::upload::{IssuedUrl, UploadRequest},
    services::issuer::IssueError,
    state::AppState,
};
use axum::{Json, body::Bytes, extract::State};
use serde_json::json;

/// Issue a presigned PUT URL for `{fileName|key, fileType|contentType}`.
///
/// An empty body counts as `{}` and so fails field validation.
pub async fn presign_upload(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IssuedUrl>, AppError> {
    let request: UploadRequest = if body.is_empty() {
        UploadRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| {
            tracing::warn!("Failed to parse body: {}", err);
            AppError::bad_request("Invalid request body")
        })?
    };

    match state.issuer.issue(&request) {
        Ok(issued) => Ok(Json(issued)),
        Err(err @ (IssueError::MissingFields | IssueError::InvalidKey | IssueError::ReservedKey)) => {
            Err(AppError::bad_request(err.to_string()))
        }
        Err(IssueError::Signing(source)) => {
            tracing::error!("Error generating presigned URL: {}", source);
            Err(AppError::internal("Failed to generate presigned URL")
                .with_details(json!(state.error_details(&source))))
        }
    }
}
