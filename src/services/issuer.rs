//! Upload URL issuer: validates an upload request and mints the presigned
//! PUT URL for it.

use crate::{
    config::UploadConfig,
    models::upload::{IssuedUrl, UploadRequest},
    services::{
        presign::{PresignError, PresignRequest, SigV4Signer, UrlSigner},
        storage_service::validate_object_key,
    },
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Missing bucketName / fileName(key) / fileType(contentType)")]
    MissingFields,
    #[error("Invalid object key")]
    InvalidKey,
    #[error("Object key is reserved")]
    ReservedKey,
    #[error("Failed to generate presigned URL")]
    Signing(#[source] PresignError),
}

/// Issues one-shot PUT URLs for the configured bucket.
///
/// Stateless apart from its configuration; nothing is written to storage
/// until the client performs the PUT.
#[derive(Clone, Debug)]
pub struct UploadUrlIssuer<S = SigV4Signer> {
    signer: S,
    bucket_name: Option<String>,
    /// Catalogue key in the same bucket; only the recorder may write it.
    reserved_key: String,
    expiry_seconds: u64,
}

impl<S: UrlSigner> UploadUrlIssuer<S> {
    pub fn new(signer: S, upload: &UploadConfig) -> Self {
        Self {
            signer,
            bucket_name: upload
                .bucket_name
                .clone()
                .filter(|name| !name.trim().is_empty()),
            reserved_key: upload.meta_object_key.trim_start_matches('/').to_string(),
            expiry_seconds: upload.presign_expiry_seconds,
        }
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// Whether a target bucket is configured at all.
    pub fn is_configured(&self) -> bool {
        self.bucket_name.is_some()
    }

    /// Issue a URL valid from now.
    pub fn issue(&self, request: &UploadRequest) -> Result<IssuedUrl, IssueError> {
        self.issue_at(request, Utc::now())
    }

    /// Issue a URL valid from `issued_at`. The object key is the requested
    /// name without leading slashes; callers are expected to make it unique.
    /// The catalogue key and anything below it are refused.
    pub fn issue_at(
        &self,
        request: &UploadRequest,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedUrl, IssueError> {
        let (Some(bucket), Some(key), Some(content_type)) = (
            self.bucket_name.as_deref(),
            request.desired_name(),
            request.desired_content_type(),
        ) else {
            tracing::warn!(
                bucket = ?self.bucket_name,
                key = ?request.desired_name(),
                content_type = ?request.desired_content_type(),
                "rejecting upload request with missing data"
            );
            return Err(IssueError::MissingFields);
        };

        let key = key.trim_start_matches('/');
        if validate_object_key(key).is_err() {
            tracing::warn!("rejecting upload request for invalid key {:?}", key);
            return Err(IssueError::InvalidKey);
        }
        if self.is_reserved(key) {
            tracing::warn!("rejecting upload request for reserved key {}", key);
            return Err(IssueError::ReservedKey);
        }

        let presign = PresignRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            expires_seconds: self.expiry_seconds,
            issued_at,
        };
        let url = self
            .signer
            .presign_put(&presign)
            .map_err(IssueError::Signing)?;

        info!("Generated presigned URL for key: {}", key);

        Ok(IssuedUrl {
            url,
            object_key: key.to_string(),
            expires_in_seconds: self.expiry_seconds,
        })
    }

    fn is_reserved(&self, key: &str) -> bool {
        key == self.reserved_key
            || key
                .strip_prefix(self.reserved_key.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}
