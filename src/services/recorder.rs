//! Metadata recorder: validates a document record and appends it to the
//! catalogue.

use crate::{
    models::document::missing_fields,
    services::metadata_store::{AppendError, CatalogueStore, DocumentStore},
};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Missing required fields")]
    MissingFields(Vec<&'static str>),
    #[error("metadata catalogue is not configured")]
    NotConfigured,
    #[error(transparent)]
    Append(#[from] AppendError),
}

/// Always appends: records are never deduplicated, updated or removed.
#[derive(Clone)]
pub struct MetadataRecorder<S = CatalogueStore> {
    store: Option<S>,
}

impl<S: DocumentStore> MetadataRecorder<S> {
    pub fn new(store: Option<S>) -> Self {
        Self { store }
    }

    /// Validate presence of the required fields, then append. Returns the
    /// catalogue length after the append.
    pub async fn record(&self, record: Value) -> Result<usize, RecordError> {
        let missing = missing_fields(&record);
        if !missing.is_empty() {
            return Err(RecordError::MissingFields(missing));
        }

        let store = self.store.as_ref().ok_or(RecordError::NotConfigured)?;
        Ok(store.append(record).await?)
    }

    pub async fn documents(&self) -> Result<Vec<Value>, RecordError> {
        let store = self.store.as_ref().ok_or(RecordError::NotConfigured)?;
        Ok(store.documents().await?)
    }
}
