//! Uploads one file through the issuer and, when a title is given, records
//! it in the document catalogue.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use docvault::client::{
    ClientConfig, DocumentDraft, HttpTransport, SelectedFile, Submission, Uploader,
    draft::DEFAULT_SCALE,
};
use std::{env, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Upload a document to docvault")]
struct Args {
    /// File to upload
    file: PathBuf,

    /// Issuer endpoint (overrides DOCVAULT_PRESIGN_URL)
    #[arg(long)]
    presign_url: Option<String>,

    /// Metadata recorder endpoint (overrides DOCVAULT_META_URL)
    #[arg(long)]
    meta_url: Option<String>,

    /// Document title; metadata is only submitted when set
    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Repeatable
    #[arg(long = "country")]
    countries: Vec<String>,

    /// Repeatable
    #[arg(long = "theme")]
    themes: Vec<String>,

    /// Repeatable
    #[arg(long = "lang")]
    langs: Vec<String>,

    /// Month of the document content, 1-12 (defaults to the current month)
    #[arg(long)]
    month: Option<u32>,

    /// Year of the document content (defaults to the current year)
    #[arg(long)]
    year: Option<i32>,

    #[arg(long, default_value = DEFAULT_SCALE)]
    scale: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ClientConfig {
        presign_url: args
            .presign_url
            .clone()
            .or_else(|| env::var("DOCVAULT_PRESIGN_URL").ok()),
        meta_url: args
            .meta_url
            .clone()
            .or_else(|| env::var("DOCVAULT_META_URL").ok()),
    };

    let file = SelectedFile::from_path(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    tracing::info!(name = %file.name, bytes = file.size(), "selected file");

    let mut uploader = Uploader::new(HttpTransport::default(), config);
    uploader.select_file(file)?;

    let key = uploader
        .upload(|pct| tracing::info!("upload progress: {}%", pct))
        .await?;
    println!("{key}");

    let Some(title) = args.title else {
        return Ok(());
    };
    let description = args.description.unwrap_or_default();
    let mut draft = DocumentDraft::new(title, description, Utc::now());
    if let Some(month) = args.month {
        draft.month = month;
    }
    if let Some(year) = args.year {
        draft.year = year;
    }
    draft.countries = args.countries;
    draft.themes = args.themes;
    draft.langs = args.langs;
    draft.scale = args.scale;

    match uploader.submit_metadata(&draft).await? {
        Submission::Recorded(record) => {
            tracing::info!(permalink = %record.permalink, "document recorded");
        }
        Submission::Preview(record) => {
            tracing::warn!("no metadata endpoint configured; record not sent");
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }
    Ok(())
}
