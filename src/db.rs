//! SQLite pool setup and schema migrations for object metadata.

use anyhow::Result;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{path::Path, str::FromStr, time::Duration};

const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Open a pool for a `sqlite://` URL, creating the database file and its
/// parent directory when missing.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    tracing::debug!("Connecting using raw URL => {}", database_url);
    let options = SqliteConnectOptions::from_str(database_url)?;
    connect_with(options).await
}

/// Open a pool for a database file on disk.
pub async fn connect_path(path: impl AsRef<Path>) -> Result<SqlitePool> {
    connect_with(SqliteConnectOptions::new().filename(path)).await
}

async fn connect_with(options: SqliteConnectOptions) -> Result<SqlitePool> {
    let db_path = options.get_filename().to_path_buf();
    tracing::debug!("Interpreted SQLite path => {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = options
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Apply the embedded schema. Every statement is idempotent, so this runs on
/// each startup as well as under `--migrate`.
pub async fn run_migrations(db: &SqlitePool) -> Result<()> {
    let statements = INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}
