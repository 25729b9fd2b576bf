//! src/services/storage_service.rs
//!
//! StorageService: S3-like object operations backed by SQLite for metadata
//! and local disk for payloads. Every write gets a fresh `version_id` and its
//! bytes land at `base_path/{bucket}/{shard}/{shard}/{key}.{version_id}`, so a
//! write never clobbers the payload of a committed version and the metadata
//! row alone decides which version is current.

use crate::models::{bucket::Bucket, object::Object};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut, stream};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    future::Future,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("region `{0}` is not supported")]
    UnsupportedRegion(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("object `{key}` in bucket `{bucket}` does not match the write condition")]
    PreconditionFailed { bucket: String, key: String },
    #[error("payload of `{key}` in bucket `{bucket}` is missing")]
    PayloadMissing { bucket: String, key: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Precondition checked atomically with the metadata commit of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Overwrite whatever is there.
    Any,
    /// The key must not exist yet.
    Absent,
    /// The current version of the key must be exactly this one.
    Version(String),
}

/// StorageService provides the object operations the upload pipeline needs:
/// - Ensure a bucket exists
/// - Put an object (streams bytes to disk, commits metadata under a condition)
/// - Get / head an object
/// - Read a small object fully into memory
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
/// Reads attempted while concurrent overwrites keep replacing the payload.
const READ_ATTEMPTS: u32 = 8;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const SUPPORTED_REGIONS: [&str; 16] = [
    "local",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "ap-southeast-1",
    "ap-northeast-1",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ap-northeast-2",
    "ap-northeast-3",
    "me-south-1",
];

const OBJECT_COLUMNS: &str = "id, bucket_id, key, filename, content_type, size_bytes, etag, \
                              storage_class, last_modified, version_id";

impl StorageService {
    /// Create a new StorageService backed by the provided SQLite pool and
    /// using `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        };

        if name.trim() != name {
            return Err(invalid("cannot begin or end with whitespace"));
        }

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }

        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }

        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }

        Ok(())
    }

    /// Validate region string against SUPPORTED_REGIONS (case-insensitive).
    fn ensure_region_valid(&self, region: &str) -> StorageResult<()> {
        if SUPPORTED_REGIONS
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(region))
        {
            Ok(())
        } else {
            Err(StorageError::UnsupportedRegion(region.to_string()))
        }
    }

    /// Physical base folder of a bucket. Does not check for existence.
    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard identifiers for an object key: the first two bytes of
    /// MD5(bucket/key) as lowercase hex.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Payload path of one version of an object.
    fn object_path(&self, bucket_name: &str, key: &str, version_id: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(format!("{}.{}", key, version_id));
        path
    }

    /// Fetch bucket metadata from SQLite.
    async fn fetch_bucket(&self, bucket: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(bucket)?;
        sqlx::query_as::<_, Bucket>(
            "SELECT id, name, region, created_at FROM buckets WHERE name = ?",
        )
        .bind(bucket)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::BucketNotFound(bucket.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    /// Fetch the current metadata record of an object.
    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE key = ? AND bucket_id = ?"
        ))
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    /// Create a bucket and its directory unless it already exists.
    ///
    /// Validates name and region. Idempotent: an existing bucket is returned
    /// as is, whatever region it was created with.
    pub async fn ensure_bucket(&self, name: &str, region: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(name)?;
        let normalized_region = region.to_lowercase();
        self.ensure_region_valid(&normalized_region)?;
        fs::create_dir_all(self.bucket_root(name)).await?;

        let inserted = sqlx::query(
            "INSERT INTO buckets (id, name, region, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(&normalized_region)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        if inserted.rows_affected() > 0 {
            tracing::info!("created bucket {} in region {}", name, normalized_region);
        }

        self.fetch_bucket(name).await
    }

    /// Stream an object to disk and commit its metadata under `condition`.
    ///
    /// - Writes bytes incrementally to a temporary file, computing MD5/etag and size.
    /// - Fsyncs and renames it to a path unique to the new version.
    /// - Commits the metadata row only if `condition` still holds; otherwise
    ///   removes the new payload and returns `PreconditionFailed`.
    /// - Removes the replaced version's payload best-effort.
    pub async fn put_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        stream: S,
        condition: WriteCondition,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        validate_object_key(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let version_id = Uuid::new_v4().to_string();
        let file_path = self.object_path(&bucket_rec.name, key, &version_id);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let (size_bytes, etag) = match write_payload(&tmp_path, stream).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        let filename = key.rsplit('/').next().unwrap_or(key).to_string();
        let candidate = Object {
            id: Uuid::new_v4(),
            bucket_id: bucket_rec.id,
            key: key.to_string(),
            filename,
            content_type,
            size_bytes,
            etag,
            storage_class: "STANDARD".into(),
            last_modified: Utc::now(),
            version_id,
        };

        let replaced = match &condition {
            WriteCondition::Any => self
                .fetch_object(&bucket_rec, key)
                .await
                .ok()
                .map(|previous| previous.version_id),
            WriteCondition::Absent => None,
            WriteCondition::Version(expected) => Some(expected.clone()),
        };

        match self.commit_object(&bucket_rec, &candidate, &condition).await {
            Ok(object) => {
                if let Some(previous) = replaced.filter(|v| *v != object.version_id) {
                    self.remove_payload(&bucket_rec.name, key, &previous).await;
                }
                debug!(
                    "stored {}/{} version {} ({} bytes)",
                    bucket_rec.name, key, object.version_id, object.size_bytes
                );
                Ok(object)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(err)
            }
        }
    }

    /// Convenience wrapper around [`put_object_stream`](Self::put_object_stream)
    /// for payloads already in memory.
    pub async fn put_object_bytes(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        body: Bytes,
        condition: WriteCondition,
    ) -> StorageResult<Object> {
        let body = stream::once(async move { Ok::<_, io::Error>(body) });
        self.put_object_stream(bucket, key, content_type, body, condition)
            .await
    }

    /// Write the metadata row for `candidate` if `condition` holds.
    async fn commit_object(
        &self,
        bucket: &Bucket,
        candidate: &Object,
        condition: &WriteCondition,
    ) -> StorageResult<Object> {
        let precondition_failed = || StorageError::PreconditionFailed {
            bucket: bucket.name.clone(),
            key: candidate.key.clone(),
        };

        match condition {
            WriteCondition::Any => {
                let sql = format!(
                    "INSERT INTO objects ({OBJECT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(bucket_id, key) DO UPDATE SET
                         filename = excluded.filename,
                         content_type = excluded.content_type,
                         size_bytes = excluded.size_bytes,
                         etag = excluded.etag,
                         storage_class = excluded.storage_class,
                         last_modified = excluded.last_modified,
                         version_id = excluded.version_id
                     RETURNING {OBJECT_COLUMNS}"
                );
                Ok(bind_insert(sqlx::query_as::<_, Object>(&sql), candidate)
                    .fetch_one(&*self.db)
                    .await?)
            }
            WriteCondition::Absent => {
                let sql = format!(
                    "INSERT INTO objects ({OBJECT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     RETURNING {OBJECT_COLUMNS}"
                );
                match bind_insert(sqlx::query_as::<_, Object>(&sql), candidate)
                    .fetch_one(&*self.db)
                    .await
                {
                    Ok(object) => Ok(object),
                    Err(err) if is_unique_violation(&err) => Err(precondition_failed()),
                    Err(err) => Err(StorageError::Sqlx(err)),
                }
            }
            WriteCondition::Version(expected) => {
                let sql = format!(
                    "UPDATE objects SET
                         filename = ?, content_type = ?, size_bytes = ?, etag = ?,
                         storage_class = ?, last_modified = ?, version_id = ?
                     WHERE bucket_id = ? AND key = ? AND version_id = ?
                     RETURNING {OBJECT_COLUMNS}"
                );
                sqlx::query_as::<_, Object>(&sql)
                    .bind(&candidate.filename)
                    .bind(&candidate.content_type)
                    .bind(candidate.size_bytes)
                    .bind(&candidate.etag)
                    .bind(&candidate.storage_class)
                    .bind(candidate.last_modified)
                    .bind(&candidate.version_id)
                    .bind(bucket.id)
                    .bind(&candidate.key)
                    .bind(expected)
                    .fetch_optional(&*self.db)
                    .await?
                    .ok_or_else(precondition_failed)
            }
        }
    }

    /// Fetch an object for reading.
    ///
    /// Returns metadata and an opened File handle ready for streaming out.
    pub async fn get_object_reader(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(Object, File)> {
        self.open_current(bucket, key, |path: PathBuf| File::open(path))
            .await
    }

    /// Read a whole object into memory. Meant for small documents such as the
    /// metadata catalogue.
    pub async fn read_object_bytes(&self, bucket: &str, key: &str) -> StorageResult<(Object, Bytes)> {
        let (object, bytes) = self
            .open_current(bucket, key, |path: PathBuf| fs::read(path))
            .await?;
        Ok((object, Bytes::from(bytes)))
    }

    /// Open the payload of the current version of `key`.
    ///
    /// An overwrite commits the new row before removing the old payload, so a
    /// payload that vanishes under us is retried against the newer version.
    /// A row whose payload stays missing is `PayloadMissing`, never
    /// `ObjectNotFound`.
    async fn open_current<T, F, Fut>(
        &self,
        bucket: &str,
        key: &str,
        open: F,
    ) -> StorageResult<(Object, T)>
    where
        F: Fn(PathBuf) -> Fut,
        Fut: Future<Output = io::Result<T>>,
    {
        validate_object_key(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let mut stale: Option<String> = None;
        for _ in 0..READ_ATTEMPTS {
            let object = self.fetch_object(&bucket_rec, key).await?;
            if stale.as_deref() == Some(object.version_id.as_str()) {
                break;
            }
            let path = self.object_path(&bucket_rec.name, key, &object.version_id);
            match open(path).await {
                Ok(payload) => return Ok((object, payload)),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!(
                        "payload of {}/{} version {} is gone, re-reading",
                        bucket, key, object.version_id
                    );
                    stale = Some(object.version_id);
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Err(StorageError::PayloadMissing {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Fetch only object metadata.
    pub async fn get_object_metadata(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        validate_object_key(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        self.fetch_object(&bucket_rec, key).await
    }

    /// Remove a superseded payload. Missing files are fine; other failures
    /// are only logged since the metadata already points elsewhere.
    async fn remove_payload(&self, bucket: &str, key: &str, version_id: &str) {
        let path = self.object_path(bucket, key, version_id);
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed superseded payload {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("superseded payload {} already missing", path.display());
            }
            Err(err) => debug!("failed to remove {}: {}", path.display(), err),
        }
    }
}

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty or oversized keys, keys that begin with `/`, contain
/// `..`, backslashes or control characters.
pub fn validate_object_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StorageError::InvalidObjectKey);
    }
    if key.starts_with('/') || key.contains("..") {
        return Err(StorageError::InvalidObjectKey);
    }
    if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
        return Err(StorageError::InvalidObjectKey);
    }
    Ok(())
}

/// Stream `stream` into a new file at `path`, returning size and hex MD5.
async fn write_payload<S>(path: &Path, stream: S) -> io::Result<(i64, String)>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = File::create(path).await?;
    let mut size_bytes: i64 = 0;
    let mut digest = Context::new();

    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as i64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok((size_bytes, format!("{:x}", digest.compute())))
}

fn bind_insert<'q>(
    query: sqlx::query::QueryAs<'q, sqlx::Sqlite, Object, sqlx::sqlite::SqliteArguments<'q>>,
    object: &'q Object,
) -> sqlx::query::QueryAs<'q, sqlx::Sqlite, Object, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(object.id)
        .bind(object.bucket_id)
        .bind(&object.key)
        .bind(&object.filename)
        .bind(&object.content_type)
        .bind(object.size_bytes)
        .bind(&object.etag)
        .bind(&object.storage_class)
        .bind(object.last_modified)
        .bind(&object.version_id)
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Check if a string matches IPv4-like dotted decimal form.
/// Rejects names formatted like `1.2.3.4`.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
