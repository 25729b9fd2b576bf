//! Shared state handed to every handler.

use crate::{
    config::AppConfig,
    services::{
        issuer::UploadUrlIssuer,
        metadata_store::CatalogueStore,
        presign::SigV4Signer,
        recorder::MetadataRecorder,
        storage_service::{StorageResult, StorageService},
    },
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    /// Verifies presigned PUTs arriving at the storage routes.
    pub signer: SigV4Signer,
    pub issuer: Arc<UploadUrlIssuer>,
    pub recorder: MetadataRecorder,
    pub expose_error_details: bool,
}

impl AppState {
    /// Wire the components from `cfg`, creating the upload bucket if one is
    /// configured. Without a bucket the issuer answers 400 and the recorder
    /// answers 500.
    pub async fn initialize(cfg: &AppConfig, db: Arc<SqlitePool>) -> StorageResult<Self> {
        let storage = StorageService::new(db, cfg.storage_dir.clone());
        let signer = SigV4Signer::new(cfg.signing.clone());

        let catalogue = match cfg.upload.bucket_name.as_deref() {
            Some(bucket) if !bucket.trim().is_empty() => {
                storage.ensure_bucket(bucket, &cfg.signing.region).await?;
                Some(CatalogueStore::new(
                    storage.clone(),
                    bucket,
                    cfg.upload.meta_object_key.clone(),
                ))
            }
            _ => {
                tracing::warn!("no upload bucket configured; uploads and metadata are disabled");
                None
            }
        };

        Ok(Self {
            issuer: Arc::new(UploadUrlIssuer::new(signer.clone(), &cfg.upload)),
            signer,
            recorder: MetadataRecorder::new(catalogue),
            storage,
            expose_error_details: cfg.expose_error_details,
        })
    }

    /// Text to put in a 500 response's `details` for `err`.
    pub fn error_details(&self, err: &dyn std::error::Error) -> String {
        if self.expose_error_details {
            err.to_string()
        } else {
            "internal error".to_string()
        }
    }
}
