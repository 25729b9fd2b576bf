//! Defines routes for the upload pipeline.
//!
//! ## Structure
//! - **Upload URL issuer**
//!   - `POST    /api/uploads/presign`: mint a presigned PUT URL
//!   - `OPTIONS /api/uploads/presign`: CORS preflight
//!
//! - **Metadata recorder**
//!   - `POST    /api/documents`: append a document record to the catalogue
//!   - `GET     /api/documents`: read the catalogue
//!   - `OPTIONS /api/documents`: CORS preflight
//!
//! - **Object storage**
//!   - `PUT  /storage/{bucket}/{*key}`: upload through a presigned URL
//!   - `GET  /storage/{bucket}/{*key}`: download object
//!   - `HEAD /storage/{bucket}/{*key}`: retrieve metadata only
//!   - `OPTIONS /storage/{bucket}/{*key}`: CORS preflight for browser PUTs
//!
//! The wildcard `*key` allows nested keys like `uploads/2025/03/report.pdf`.
//! Every response carries permissive CORS headers.

use crate::{
    handlers::{
        cors::{preflight, storage_preflight, with_cors_headers},
        document_handlers::{list_documents, record_document},
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, head_object, upload_object},
        upload_handlers::presign_upload,
    },
    state::AppState,
};
use axum::{
    Router, middleware,
    routing::{get, post, put},
};

/// Build and return the router carrying `AppState` to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/uploads/presign",
            post(presign_upload).options(preflight),
        )
        .route(
            "/api/documents",
            post(record_document)
                .get(list_documents)
                .options(preflight),
        )
        .route(
            "/storage/{bucket}/{*key}",
            put(upload_object)
                .get(get_object)
                .head(head_object)
                .options(storage_preflight),
        )
        .layer(middleware::map_response(with_cors_headers))
}
