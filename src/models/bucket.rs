//! Represents a logical bucket: a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage bucket.
///
/// Buckets act as namespaces for objects. Uploaded documents and the
/// metadata catalogue live in the bucket named by the upload configuration.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Unique identifier for this bucket (UUID for internal DB use).
    pub id: Uuid,

    /// Globally unique bucket name (must conform to DNS naming rules).
    pub name: String,

    /// Region the bucket is signed for (e.g. "local", "eu-west-1").
    pub region: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
