use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, str::FromStr};

/// Catalogue object the metadata recorder appends to when nothing else is configured.
pub const DEFAULT_META_OBJECT_KEY: &str = "data/DocumentsRPCA.json";

/// Lifetime of an issued upload URL.
pub const DEFAULT_PRESIGN_EXPIRY_SECONDS: u64 = 300;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub upload: UploadConfig,
    pub signing: SigningConfig,
    /// Echo internal error text in 500 responses. Off unless explicitly enabled.
    pub expose_error_details: bool,
}

/// Settings shared by the upload URL issuer and the metadata recorder.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Bucket that receives uploads and holds the catalogue. `None` disables both.
    pub bucket_name: Option<String>,
    pub meta_object_key: String,
    pub presign_expiry_seconds: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket_name: None,
            meta_object_key: DEFAULT_META_OBJECT_KEY.into(),
            presign_expiry_seconds: DEFAULT_PRESIGN_EXPIRY_SECONDS,
        }
    }
}

/// Credentials and endpoint used to sign and verify upload URLs.
#[derive(Clone)]
pub struct SigningConfig {
    /// Base URL the storage routes are reachable at, e.g. `http://127.0.0.1:3000/storage`.
    pub public_endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("public_endpoint", &self.public_endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Document upload and metadata service")]
pub struct Args {
    /// Host to bind to (overrides DOCVAULT_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides DOCVAULT_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides DOCVAULT_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides DOCVAULT_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket for uploads and the metadata catalogue (overrides DOCVAULT_BUCKET_NAME)
    #[arg(long)]
    pub bucket_name: Option<String>,

    /// Object key of the metadata catalogue (overrides DOCVAULT_META_OBJECT_KEY)
    #[arg(long)]
    pub meta_object_key: Option<String>,

    /// Lifetime of issued upload URLs in seconds (overrides DOCVAULT_PRESIGN_EXPIRY_SECONDS)
    #[arg(long)]
    pub presign_expiry_seconds: Option<u64>,

    /// Public base URL of the storage routes (overrides DOCVAULT_PUBLIC_ENDPOINT)
    #[arg(long)]
    pub public_endpoint: Option<String>,

    /// Signing region (overrides DOCVAULT_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("DOCVAULT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("DOCVAULT_PORT", 3000u16)?;
        let env_storage =
            env::var("DOCVAULT_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("DOCVAULT_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/docvault.db".into());
        let env_bucket = env::var("DOCVAULT_BUCKET_NAME")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let env_meta_key = env::var("DOCVAULT_META_OBJECT_KEY")
            .unwrap_or_else(|_| DEFAULT_META_OBJECT_KEY.into());
        let env_expiry = env_parse(
            "DOCVAULT_PRESIGN_EXPIRY_SECONDS",
            DEFAULT_PRESIGN_EXPIRY_SECONDS,
        )?;
        let env_endpoint = env::var("DOCVAULT_PUBLIC_ENDPOINT").ok();
        let env_region = env::var("DOCVAULT_REGION").unwrap_or_else(|_| "local".into());
        let expose_error_details = env_parse("DOCVAULT_EXPOSE_ERROR_DETAILS", false)?;

        // --- Merge ---
        let port = args.port.unwrap_or(env_port);
        let public_endpoint = args
            .public_endpoint
            .or(env_endpoint)
            .unwrap_or_else(|| format!("http://127.0.0.1:{}/storage", port));

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            upload: UploadConfig {
                bucket_name: args.bucket_name.or(env_bucket),
                meta_object_key: args.meta_object_key.unwrap_or(env_meta_key),
                presign_expiry_seconds: args.presign_expiry_seconds.unwrap_or(env_expiry),
            },
            signing: SigningConfig {
                public_endpoint,
                access_key: env::var("DOCVAULT_ACCESS_KEY").unwrap_or_default(),
                secret_key: env::var("DOCVAULT_SECRET_KEY").unwrap_or_default(),
                region: args.region.unwrap_or(env_region),
            },
            expose_error_details,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
