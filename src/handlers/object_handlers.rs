//! HTTP handlers for object operations.
//! Streams object bodies to avoid buffering in memory and delegates storage
//! concerns to `StorageService`. Writes are only accepted through a valid
//! presigned URL.

use crate::{
    errors::AppError,
    models::object::Object,
    services::{
        presign::{IncomingPut, PresignedQuery},
        storage_service::WriteCondition,
    },
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, header},
    response::Response,
};
use chrono::Utc;
use futures::StreamExt;
use std::io;
use tokio_util::io::ReaderStream;

const VERSION_ID_HEADER: HeaderName = HeaderName::from_static("x-amz-version-id");

/// Upload an object to `/storage/{bucket}/{*key}` using a presigned URL.
///
/// The signature must cover this bucket, key, host and `Content-Type`, and
/// must not have expired; anything else is a 403 before the body is read.
pub async fn upload_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(auth): Query<PresignedQuery>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or_default();

    let incoming = IncomingPut {
        bucket: &bucket,
        key: &key,
        host,
        content_type: content_type.as_deref(),
    };
    if let Err(err) = state.signer.verify_put(&incoming, &auth, Utc::now()) {
        tracing::warn!("refusing PUT {}/{}: {}", bucket, key, err);
        return Err(AppError::forbidden(err.to_string()));
    }

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let object = state
        .storage
        .put_object_stream(&bucket, &key, content_type, stream, WriteCondition::Any)
        .await?;

    tracing::info!(
        "stored {}/{} ({} bytes) via presigned PUT",
        bucket,
        key,
        object.size_bytes
    );

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_version_headers(response.headers_mut(), &object);
    Ok(response)
}

/// Download an object `/storage/{bucket}/{*key}` as a streaming response.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, file) = state.storage.get_object_reader(&bucket, &key).await?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

/// HEAD `/storage/{bucket}/{*key}`: same headers as GET but no body.
pub async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let meta = state.storage.get_object_metadata(&bucket, &key).await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

fn set_version_headers(headers: &mut HeaderMap, meta: &Object) {
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.etag)) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&meta.version_id) {
        headers.insert(VERSION_ID_HEADER, value);
    }
}

fn set_object_headers(headers: &mut HeaderMap, meta: &Object) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size_bytes.max(0) as u64),
    );

    set_version_headers(headers, meta);

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
