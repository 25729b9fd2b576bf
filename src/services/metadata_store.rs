//! The document catalogue: one JSON array object in storage, appended to
//! with an optimistic compare-and-swap on the object's version.

use crate::services::storage_service::{StorageError, StorageService, WriteCondition};
use bytes::Bytes;
use serde_json::Value;
use std::{future::Future, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Appends attempted before giving up on a contended catalogue.
pub const MAX_APPEND_ATTEMPTS: u32 = 16;

const RETRY_BACKOFF: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
pub enum AppendError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("catalogue `{key}` still contended after {attempts} attempts")]
    Contention { key: String, attempts: u32 },
    #[error("failed to serialize catalogue: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Atomic append-only access to an ordered sequence of documents.
pub trait DocumentStore: Send + Sync {
    /// Append `record` at the end; returns the new length.
    fn append(&self, record: Value) -> impl Future<Output = Result<usize, AppendError>> + Send;

    /// Current documents in append order.
    fn documents(&self) -> impl Future<Output = Result<Vec<Value>, AppendError>> + Send;
}

/// Catalogue contents together with the version they were read at.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: Vec<Value>,
    /// `None` when the catalogue object does not exist yet.
    pub version: Option<String>,
}

/// Catalogue stored as a single pretty-printed JSON array object.
#[derive(Clone)]
pub struct CatalogueStore {
    storage: StorageService,
    bucket: String,
    key: String,
}

impl CatalogueStore {
    pub fn new(storage: StorageService, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Read the catalogue. A missing object is an empty catalogue at no
    /// version; unparsable content is an empty catalogue at the stored version.
    /// A stored version whose payload cannot be read is an error.
    pub async fn snapshot(&self) -> Result<Snapshot, StorageError> {
        match self.storage.read_object_bytes(&self.bucket, &self.key).await {
            Ok((object, bytes)) => Ok(Snapshot {
                records: parse_catalogue(&bytes),
                version: Some(object.version_id),
            }),
            Err(StorageError::ObjectNotFound { .. }) => Ok(Snapshot::default()),
            Err(err) => Err(err),
        }
    }
}

impl DocumentStore for CatalogueStore {
    async fn append(&self, record: Value) -> Result<usize, AppendError> {
        for attempt in 1..=MAX_APPEND_ATTEMPTS {
            let Snapshot {
                mut records,
                version,
            } = self.snapshot().await?;
            records.push(record.clone());
            let body = Bytes::from(serde_json::to_vec_pretty(&records)?);

            let condition = match version {
                Some(version) => WriteCondition::Version(version),
                None => WriteCondition::Absent,
            };

            match self
                .storage
                .put_object_bytes(
                    &self.bucket,
                    &self.key,
                    Some("application/json".into()),
                    body,
                    condition,
                )
                .await
            {
                Ok(object) => {
                    info!(
                        "appended document #{} to {}/{} (version {})",
                        records.len(),
                        self.bucket,
                        self.key,
                        object.version_id
                    );
                    return Ok(records.len());
                }
                Err(StorageError::PreconditionFailed { .. }) => {
                    debug!("catalogue changed underneath append, attempt {}", attempt);
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(
            "giving up on {}/{} after {} attempts",
            self.bucket, self.key, MAX_APPEND_ATTEMPTS
        );
        Err(AppendError::Contention {
            key: self.key.clone(),
            attempts: MAX_APPEND_ATTEMPTS,
        })
    }

    async fn documents(&self) -> Result<Vec<Value>, AppendError> {
        Ok(self.snapshot().await?.records)
    }
}

/// Parse stored catalogue bytes. Anything but a JSON array is empty.
pub fn parse_catalogue(bytes: &[u8]) -> Vec<Value> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Array(records)) => records,
        Ok(_) | Err(_) => Vec::new(),
    }
}
