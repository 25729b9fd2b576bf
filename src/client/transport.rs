//! HTTP side of the uploader: talks to the issuer, the storage PUT URL and
//! the metadata recorder.

use crate::{
    client::uploader::SelectedFile,
    models::{
        document::DocumentMetadata,
        upload::{IssuedUrl, UploadRequest},
    },
};
use bytes::Bytes;
use futures::stream;
use reqwest::{Body, Client, StatusCode, header};
use serde_json::Value;
use std::{future::Future, sync::Arc};
use thiserror::Error;
use tracing::debug;

/// Size of each body chunk handed to the connection during a PUT.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Receives upload progress as a whole percentage.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// The three calls the uploader makes.
pub trait UploadTransport: Send + Sync {
    fn request_upload_url(
        &self,
        endpoint: &str,
        request: &UploadRequest,
    ) -> impl Future<Output = Result<IssuedUrl, TransportError>> + Send;

    /// PUT the whole file to `url`, reporting progress as chunks are sent.
    fn put_object(
        &self,
        url: &str,
        file: &SelectedFile,
        on_progress: ProgressFn,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn submit_metadata(
        &self,
        endpoint: &str,
        record: &DocumentMetadata,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl UploadTransport for HttpTransport {
    async fn request_upload_url(
        &self,
        endpoint: &str,
        request: &UploadRequest,
    ) -> Result<IssuedUrl, TransportError> {
        let response = self.client.post(endpoint).json(request).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(status_error(status, text));
        }
        decode_issued_url(&text)
    }

    async fn put_object(
        &self,
        url: &str,
        file: &SelectedFile,
        on_progress: ProgressFn,
    ) -> Result<(), TransportError> {
        let total = file.size();
        let chunks = split_chunks(&file.bytes, UPLOAD_CHUNK_SIZE);
        if total == 0 {
            on_progress(100);
        }

        let mut sent = 0usize;
        let body = stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len();
            on_progress(percent(sent, total));
            Ok::<_, std::io::Error>(chunk)
        }));

        debug!(bytes = total, "uploading object");
        let response = self
            .client
            .put(url)
            .header(header::CONTENT_TYPE, file.content_type())
            .header(header::CONTENT_LENGTH, total)
            .body(Body::wrap_stream(body))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }
        Ok(())
    }

    async fn submit_metadata(
        &self,
        endpoint: &str,
        record: &DocumentMetadata,
    ) -> Result<(), TransportError> {
        let response = self.client.post(endpoint).json(record).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }
        Ok(())
    }
}

/// Whole percentage of `sent` out of `total`, rounded to nearest.
pub fn percent(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

fn split_chunks(bytes: &Bytes, size: usize) -> Vec<Bytes> {
    (0..bytes.len())
        .step_by(size)
        .map(|start| bytes.slice(start..bytes.len().min(start + size)))
        .collect()
}

fn status_error(status: StatusCode, body: String) -> TransportError {
    TransportError::Status {
        status: status.as_u16(),
        body,
    }
}

/// Parse an issuer response. Gateways that wrap the payload as
/// `{"body": "<json string>"}` are unwrapped first.
fn decode_issued_url(text: &str) -> Result<IssuedUrl, TransportError> {
    let mut value: Value =
        serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))?;
    if let Some(inner) = value.get("body").and_then(Value::as_str) {
        value = serde_json::from_str(inner).map_err(|e| TransportError::Decode(e.to_string()))?;
    }
    let issued: IssuedUrl =
        serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))?;
    if issued.url.is_empty() {
        return Err(TransportError::Decode("response has no upload URL".into()));
    }
    Ok(issued)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_to_nearest() {
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn chunks_cover_the_payload() {
        let bytes = Bytes::from(vec![7u8; 10]);
        let chunks = split_chunks(&bytes, 4);
        assert_eq!(chunks.iter().map(Bytes::len).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert!(split_chunks(&Bytes::new(), 4).is_empty());
    }

    #[test]
    fn decodes_plain_and_wrapped_responses() {
        let plain = decode_issued_url(r#"{"uploadURL":"http://u","key":"k","expiresIn":300}"#).unwrap();
        assert_eq!(plain.url, "http://u");
        assert_eq!(plain.object_key, "k");

        let wrapped =
            decode_issued_url(r#"{"body":"{\"url\":\"http://w\",\"key\":\"k2\"}"}"#).unwrap();
        assert_eq!(wrapped.url, "http://w");
        assert_eq!(wrapped.object_key, "k2");
    }

    #[test]
    fn response_without_url_is_rejected() {
        assert!(matches!(
            decode_issued_url(r#"{"key":"k"}"#),
            Err(TransportError::Decode(_))
        ));
        assert!(matches!(
            decode_issued_url("not json"),
            Err(TransportError::Decode(_))
        ));
    }
}
