//! Upload state machine driving one file through issue, PUT and metadata
//! submission.

use crate::{
    client::{
        draft::{DocumentDraft, DraftError},
        transport::{ProgressFn, TransportError, UploadTransport},
    },
    models::{document::DocumentMetadata, upload::UploadRequest},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};
use thiserror::Error;
use tracing::{info, warn};

/// Extensions the upload form offers. Not enforced.
pub const ACCEPTED_EXTENSIONS: [&str; 4] = ["pdf", "png", "jpg", "jpeg"];

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A file held in memory, ready to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(
        name: impl Into<String>,
        content_type: Option<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.filter(|t| !t.trim().is_empty()),
            bytes: bytes.into(),
        }
    }

    /// Read `path`, naming the file after its last component and guessing
    /// the content type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = guess_content_type(&name).map(str::to_string);
        Ok(Self::new(name, content_type, bytes))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Declared type, or `application/octet-stream`.
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(FALLBACK_CONTENT_TYPE)
    }

    pub fn has_accepted_extension(&self) -> bool {
        extension(&self.name)
            .is_some_and(|ext| ACCEPTED_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
    }
}

fn extension(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(_, ext)| ext)
}

fn guess_content_type(name: &str) -> Option<&'static str> {
    match extension(name)?.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    FileSelected,
    Uploading,
    Success { uploaded_key: String },
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Missing presign endpoint")]
    MissingPresignEndpoint,
    #[error("no file selected")]
    NoFileSelected,
    #[error("an upload is already in progress")]
    UploadInProgress,
    #[error("file has already been uploaded")]
    AlreadyUploaded,
    #[error("nothing has been uploaded yet")]
    NothingUploaded,
    #[error("Failed to get presigned URL: {0}")]
    Presign(#[source] TransportError),
    #[error("Upload failed: {0}")]
    Put(#[source] TransportError),
    #[error("Metadata submission failed: {0}")]
    Metadata(#[source] TransportError),
    #[error(transparent)]
    Draft(#[from] DraftError),
}

/// What became of a built catalogue record.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Posted to the metadata recorder.
    Recorded(DocumentMetadata),
    /// No recorder is configured; the record was built but not sent.
    Preview(DocumentMetadata),
}

impl Submission {
    pub fn record(&self) -> &DocumentMetadata {
        match self {
            Submission::Recorded(record) | Submission::Preview(record) => record,
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, Submission::Recorded(_))
    }
}

/// Where the uploader sends its requests. Blank values count as missing.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub presign_url: Option<String>,
    pub meta_url: Option<String>,
}

fn endpoint(url: &Option<String>) -> Option<&str> {
    url.as_deref().map(str::trim).filter(|u| !u.is_empty())
}

pub struct Uploader<T> {
    transport: T,
    config: ClientConfig,
    state: UploadState,
    file: Option<SelectedFile>,
    progress: Arc<AtomicU8>,
}

impl<T: UploadTransport> Uploader<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            state: UploadState::Idle,
            file: None,
            progress: Arc::new(AtomicU8::new(0)),
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Shared progress counter, readable while an upload is running.
    pub fn progress_handle(&self) -> Arc<AtomicU8> {
        Arc::clone(&self.progress)
    }

    pub fn uploaded_key(&self) -> Option<&str> {
        match &self.state {
            UploadState::Success { uploaded_key } => Some(uploaded_key),
            _ => None,
        }
    }

    pub fn select_file(&mut self, file: SelectedFile) -> Result<(), UploadError> {
        if self.state == UploadState::Uploading {
            return Err(UploadError::UploadInProgress);
        }
        if !file.has_accepted_extension() {
            warn!(name = %file.name, "selected file has an unusual extension");
        }
        self.file = Some(file);
        self.progress.store(0, Ordering::Relaxed);
        self.state = UploadState::FileSelected;
        Ok(())
    }

    /// Back to `Idle`, dropping the selected file. Also recovers an upload
    /// whose future was dropped mid-flight.
    pub fn reset(&mut self) {
        self.file = None;
        self.progress.store(0, Ordering::Relaxed);
        self.state = UploadState::Idle;
    }

    pub async fn upload(
        &mut self,
        on_progress: impl Fn(u8) + Send + Sync + 'static,
    ) -> Result<String, UploadError> {
        self.upload_at(Utc::now(), on_progress).await
    }

    /// Upload the selected file under `{unix_millis}_{name}` taken from `now`.
    ///
    /// Allowed from `FileSelected` and `Error`; the file is kept on failure so
    /// the call can simply be repeated.
    pub async fn upload_at(
        &mut self,
        now: DateTime<Utc>,
        on_progress: impl Fn(u8) + Send + Sync + 'static,
    ) -> Result<String, UploadError> {
        match self.state {
            UploadState::Uploading => return Err(UploadError::UploadInProgress),
            UploadState::Success { .. } => return Err(UploadError::AlreadyUploaded),
            UploadState::Idle => return Err(UploadError::NoFileSelected),
            UploadState::FileSelected | UploadState::Error { .. } => {}
        }
        let Some(file) = self.file.clone() else {
            return Err(UploadError::NoFileSelected);
        };

        let Some(presign_url) = endpoint(&self.config.presign_url).map(str::to_string) else {
            return Err(self.fail(UploadError::MissingPresignEndpoint));
        };

        self.state = UploadState::Uploading;
        self.progress.store(0, Ordering::Relaxed);

        let key = format!("{}_{}", now.timestamp_millis(), file.name);
        let request = UploadRequest::new(key.clone(), file.content_type());
        let issued = match self.transport.request_upload_url(&presign_url, &request).await {
            Ok(issued) => issued,
            Err(err) => return Err(self.fail(UploadError::Presign(err))),
        };

        let progress = Arc::clone(&self.progress);
        let sink: ProgressFn = Arc::new(move |pct| {
            progress.store(pct, Ordering::Relaxed);
            on_progress(pct);
        });
        if let Err(err) = self.transport.put_object(&issued.url, &file, sink).await {
            return Err(self.fail(UploadError::Put(err)));
        }

        let uploaded_key = if issued.object_key.is_empty() {
            key
        } else {
            issued.object_key
        };
        info!(key = %uploaded_key, bytes = file.size(), "upload complete");
        self.progress.store(100, Ordering::Relaxed);
        self.state = UploadState::Success {
            uploaded_key: uploaded_key.clone(),
        };
        Ok(uploaded_key)
    }

    pub async fn submit_metadata(
        &self,
        draft: &DocumentDraft,
    ) -> Result<Submission, UploadError> {
        self.submit_metadata_at(draft, Utc::now()).await
    }

    /// Build the catalogue record for the uploaded key and post it. Without a
    /// metadata endpoint the record is returned as a preview and nothing is
    /// sent. Does not change the upload state.
    pub async fn submit_metadata_at(
        &self,
        draft: &DocumentDraft,
        now: DateTime<Utc>,
    ) -> Result<Submission, UploadError> {
        let uploaded_key = self.uploaded_key().ok_or(UploadError::NothingUploaded)?;
        let record = draft.build(uploaded_key, now)?;

        let Some(meta_url) = endpoint(&self.config.meta_url) else {
            info!(permalink = %record.permalink, "no metadata endpoint, record not sent");
            return Ok(Submission::Preview(record));
        };

        self.transport
            .submit_metadata(meta_url, &record)
            .await
            .map_err(UploadError::Metadata)?;
        info!(permalink = %record.permalink, "metadata submitted");
        Ok(Submission::Recorded(record))
    }

    fn fail(&mut self, err: UploadError) -> UploadError {
        warn!(error = %err, "upload failed");
        self.state = UploadState::Error {
            message: err.to_string(),
        };
        err
    }
}
