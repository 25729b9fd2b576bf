//! Presigned upload URLs.
//!
//! URLs are signed with AWS Signature Version 4 query parameters so that a
//! client without credentials can perform exactly one kind of request for a
//! limited time. Upload URLs sign the `content-type` header next to `host`,
//! which binds them to the content type chosen at issuance. The storage
//! routes verify incoming PUTs with the same [`SigV4Signer`].

use crate::config::SigningConfig;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, fmt::Write};
use thiserror::Error;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Maximum expiration time for presigned URLs (7 days in seconds).
pub const MAX_EXPIRES_SECONDS: u64 = 604_800;

const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "content-type;host";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const PUT: &str = "PUT";

/// Everything a PUT URL is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignRequest {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub expires_seconds: u64,
    pub issued_at: DateTime<Utc>,
}

/// Capability to mint presigned PUT URLs.
pub trait UrlSigner: Send + Sync {
    fn presign_put(&self, request: &PresignRequest) -> Result<String, PresignError>;
}

/// Errors that can occur during presigned URL generation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresignError {
    #[error("access key is required")]
    MissingAccessKey,
    #[error("secret key is required")]
    MissingSecretKey,
    #[error("bucket name is invalid")]
    InvalidBucket,
    #[error("object key is invalid")]
    InvalidKey,
    #[error("endpoint URL `{0}` is invalid")]
    InvalidEndpoint(String),
    #[error("signing key could not be derived")]
    Signing,
}

/// Reasons an incoming presigned request is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing query parameter {0}")]
    MissingParameter(&'static str),
    #[error("unsupported signing algorithm")]
    UnsupportedAlgorithm,
    #[error("signed headers must be `{SIGNED_HEADERS}`")]
    SignedHeadersMismatch,
    #[error("unknown access key")]
    UnknownAccessKey,
    #[error("credential scope does not match this endpoint")]
    InvalidCredentialScope,
    #[error("malformed X-Amz-Date")]
    MalformedDate,
    #[error("malformed X-Amz-Expires")]
    MalformedExpiry,
    #[error("request has expired")]
    Expired,
    #[error("signature does not match")]
    SignatureMismatch,
}

/// SigV4 query parameters carried by a presigned request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresignedQuery {
    #[serde(rename = "X-Amz-Algorithm")]
    pub algorithm: Option<String>,
    #[serde(rename = "X-Amz-Credential")]
    pub credential: Option<String>,
    #[serde(rename = "X-Amz-Date")]
    pub date: Option<String>,
    #[serde(rename = "X-Amz-Expires")]
    pub expires: Option<String>,
    #[serde(rename = "X-Amz-SignedHeaders")]
    pub signed_headers: Option<String>,
    #[serde(rename = "X-Amz-Signature")]
    pub signature: Option<String>,
}

/// The PUT request being checked against its presigned query.
#[derive(Debug, Clone)]
pub struct IncomingPut<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub host: &'a str,
    pub content_type: Option<&'a str>,
}

/// Signs and verifies path-style URLs below `SigningConfig::public_endpoint`.
#[derive(Clone, Debug)]
pub struct SigV4Signer {
    config: SigningConfig,
}

struct Endpoint<'a> {
    origin: &'a str,
    host: &'a str,
    base_path: &'a str,
}

impl SigV4Signer {
    pub fn new(config: SigningConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self) -> Result<Endpoint<'_>, PresignError> {
        let raw = self.config.public_endpoint.trim_end_matches('/');
        let (scheme_len, rest) = if let Some(rest) = raw.strip_prefix("http://") {
            ("http://".len(), rest)
        } else if let Some(rest) = raw.strip_prefix("https://") {
            ("https://".len(), rest)
        } else {
            (0, raw)
        };
        let host_len = rest.find('/').unwrap_or(rest.len());
        let host = &rest[..host_len];
        if host.is_empty() {
            return Err(PresignError::InvalidEndpoint(raw.to_string()));
        }
        Ok(Endpoint {
            origin: &raw[..scheme_len + host_len],
            host,
            base_path: &rest[host_len..],
        })
    }

    fn credential_scope(&self, date: &str) -> String {
        format!("{}/{}/{}/aws4_request", date, self.config.region, SERVICE)
    }

    /// Compute the hex signature of a canonical PUT request.
    fn signature_for(
        &self,
        canonical_path: &str,
        query: &BTreeMap<String, String>,
        host: &str,
        content_type: &str,
        signed_at: &DateTime<Utc>,
    ) -> Option<Hmac<Sha256>> {
        let date = signed_at.format("%Y%m%d").to_string();
        let amz_date = signed_at.format(AMZ_DATE_FORMAT).to_string();

        let canonical_request = format!(
            "{}\n{}\n{}\ncontent-type:{}\nhost:{}\n\n{}\n{}",
            PUT,
            canonical_path,
            build_canonical_query_string(query),
            content_type.trim(),
            host,
            SIGNED_HEADERS,
            UNSIGNED_PAYLOAD
        );

        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            self.credential_scope(&date),
            hex_sha256(canonical_request.as_bytes())
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", self.config.secret_key).as_bytes(),
            date.as_bytes(),
        )?;
        let k_region = hmac_sha256(&k_date, self.config.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;

        let mut mac = Hmac::<Sha256>::new_from_slice(&k_signing).ok()?;
        mac.update(string_to_sign.as_bytes());
        Some(mac)
    }

    /// Check that `request` is exactly the PUT its presigned query authorizes
    /// and that the authorization has not expired at `now`.
    pub fn verify_put(
        &self,
        request: &IncomingPut<'_>,
        query: &PresignedQuery,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let algorithm = required(&query.algorithm, "X-Amz-Algorithm")?;
        let credential = required(&query.credential, "X-Amz-Credential")?;
        let amz_date = required(&query.date, "X-Amz-Date")?;
        let expires = required(&query.expires, "X-Amz-Expires")?;
        let signed_headers = required(&query.signed_headers, "X-Amz-SignedHeaders")?;
        let signature = required(&query.signature, "X-Amz-Signature")?;

        if algorithm != ALGORITHM {
            return Err(SignatureError::UnsupportedAlgorithm);
        }
        if signed_headers != SIGNED_HEADERS {
            return Err(SignatureError::SignedHeadersMismatch);
        }

        let signed_at = NaiveDateTime::parse_from_str(amz_date, AMZ_DATE_FORMAT)
            .map_err(|_| SignatureError::MalformedDate)?
            .and_utc();
        let expires_seconds = expires
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs <= MAX_EXPIRES_SECONDS)
            .ok_or(SignatureError::MalformedExpiry)?;

        let (access_key, scope) = credential
            .split_once('/')
            .ok_or(SignatureError::InvalidCredentialScope)?;
        if self.config.access_key.is_empty() || access_key != self.config.access_key {
            return Err(SignatureError::UnknownAccessKey);
        }
        if scope != self.credential_scope(&signed_at.format("%Y%m%d").to_string()) {
            return Err(SignatureError::InvalidCredentialScope);
        }

        if now > signed_at + Duration::seconds(expires_seconds as i64) {
            return Err(SignatureError::Expired);
        }

        let endpoint = self
            .endpoint()
            .map_err(|_| SignatureError::SignatureMismatch)?;
        let canonical_path = canonical_path(endpoint.base_path, request.bucket, request.key);
        let params = signing_params(credential, amz_date, expires);
        let provided = hex::decode(signature).map_err(|_| SignatureError::SignatureMismatch)?;

        let mac = self
            .signature_for(
                &canonical_path,
                &params,
                request.host,
                request.content_type.unwrap_or_default(),
                &signed_at,
            )
            .ok_or(SignatureError::SignatureMismatch)?;
        mac.verify_slice(&provided)
            .map_err(|_| SignatureError::SignatureMismatch)
    }
}

impl UrlSigner for SigV4Signer {
    fn presign_put(&self, request: &PresignRequest) -> Result<String, PresignError> {
        if self.config.access_key.is_empty() {
            return Err(PresignError::MissingAccessKey);
        }
        if self.config.secret_key.is_empty() {
            return Err(PresignError::MissingSecretKey);
        }
        if request.bucket.is_empty() {
            return Err(PresignError::InvalidBucket);
        }
        let key = request.key.trim_start_matches('/');
        if key.is_empty() {
            return Err(PresignError::InvalidKey);
        }

        let endpoint = self.endpoint()?;
        let expires = request.expires_seconds.min(MAX_EXPIRES_SECONDS).to_string();
        let date = request.issued_at.format("%Y%m%d").to_string();
        let amz_date = request.issued_at.format(AMZ_DATE_FORMAT).to_string();
        let credential = format!("{}/{}", self.config.access_key, self.credential_scope(&date));

        let canonical_path = canonical_path(endpoint.base_path, &request.bucket, key);
        let params = signing_params(&credential, &amz_date, &expires);

        let mac = self
            .signature_for(
                &canonical_path,
                &params,
                endpoint.host,
                &request.content_type,
                &request.issued_at,
            )
            .ok_or(PresignError::Signing)?;
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!(
            "{}{}?{}&X-Amz-Signature={}",
            endpoint.origin,
            canonical_path,
            build_canonical_query_string(&params),
            signature
        ))
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, SignatureError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(SignatureError::MissingParameter(name))
}

fn signing_params(credential: &str, amz_date: &str, expires: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()),
        ("X-Amz-Credential".to_string(), credential.to_string()),
        ("X-Amz-Date".to_string(), amz_date.to_string()),
        ("X-Amz-Expires".to_string(), expires.to_string()),
        ("X-Amz-SignedHeaders".to_string(), SIGNED_HEADERS.to_string()),
    ])
}

/// Encoded path-style URI of an object below the endpoint's base path.
fn canonical_path(base_path: &str, bucket: &str, key: &str) -> String {
    uri_encode_path(&format!("{}/{}/{}", base_path, bucket, key))
}

/// URI-encode a path (preserving slashes).
fn uri_encode_path(path: &str) -> String {
    encode(path, true)
}

/// URI-encode a query parameter value.
fn uri_encode_value(value: &str) -> String {
    encode(value, false)
}

fn encode(input: &str, keep_slash: bool) -> String {
    let mut result = String::with_capacity(input.len() * 3);
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(b as char)
            }
            b'/' if keep_slash => result.push('/'),
            _ => {
                let _ = write!(result, "%{:02X}", b);
            }
        }
    }
    result
}

/// Build canonical query string from parameters.
fn build_canonical_query_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode_value(k), uri_encode_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Option<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).ok()?;
    mac.update(data);
    Some(mac.finalize().into_bytes().to_vec())
}
