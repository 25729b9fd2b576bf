//! `/api/documents`: the metadata recorder over HTTP.

use crate::{errors::AppError, services::recorder::RecordError, state::AppState};
use axum::{Json, body::Bytes, extract::State};
use serde_json::{Value, json};

/// `POST /api/documents`: append one document record to the catalogue.
pub async fn record_document(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let record: Value = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body).map_err(|err| {
            tracing::warn!("Body parse error: {}", err);
            AppError::bad_request("Invalid JSON body")
        })?
    };

    state
        .recorder
        .record(record)
        .await
        .map_err(|err| into_app_error(err, "Failed to update metadata file"))?;
    Ok(Json(json!({ "ok": true })))
}

/// `GET /api/documents`: the catalogue as stored, in append order.
pub async fn list_documents(State(state): State<AppState>) -> Result<Json<Vec<Value>>, AppError> {
    let docs = state
        .recorder
        .documents()
        .await
        .map_err(|err| into_app_error(err, "Failed to read metadata file"))?;
    Ok(Json(docs))
}

fn into_app_error(err: RecordError, failure: &str) -> AppError {
    match err {
        RecordError::MissingFields(fields) => {
            AppError::bad_request("Missing required fields").with_details(json!(fields))
        }
        other => {
            tracing::error!("metadata catalogue error: {}", other);
            AppError::internal(failure)
        }
    }
}
