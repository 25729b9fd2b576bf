#![allow(dead_code)]

use docvault::{
    config::{AppConfig, SigningConfig, UploadConfig},
    db, routes,
    state::AppState,
};
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const BUCKET: &str = "docs-bucket";
pub const META_KEY: &str = "data/DocumentsRPCA.json";

pub struct TestApp {
    pub addr: SocketAddr,
    pub state: AppState,
    pub client: reqwest::Client,
    _dir: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn documents(&self) -> Vec<Value> {
        self.state.recorder.documents().await.unwrap()
    }
}

pub struct Options {
    pub bucket: Option<&'static str>,
    pub access_key: &'static str,
    pub secret_key: &'static str,
    pub expose_error_details: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            bucket: Some(BUCKET),
            access_key: "AKIDEXAMPLE",
            secret_key: "test-secret",
            expose_error_details: false,
        }
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(Options::default()).await
}

/// Serve the real router on an ephemeral port backed by a temp directory.
pub async fn spawn_app_with(options: Options) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let cfg = AppConfig {
        host: "127.0.0.1".into(),
        port: addr.port(),
        storage_dir: dir.path().join("objects").display().to_string(),
        database_url: String::new(),
        upload: UploadConfig {
            bucket_name: options.bucket.map(str::to_string),
            meta_object_key: META_KEY.into(),
            ..UploadConfig::default()
        },
        signing: SigningConfig {
            public_endpoint: format!("http://{}/storage", addr),
            access_key: options.access_key.into(),
            secret_key: options.secret_key.into(),
            region: "local".into(),
        },
        expose_error_details: options.expose_error_details,
    };

    std::fs::create_dir_all(&cfg.storage_dir).unwrap();
    let pool = db::connect_path(dir.path().join("meta.db")).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let state = AppState::initialize(&cfg, Arc::new(pool)).await.unwrap();

    let app = routes::routes::routes().with_state(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        addr,
        state,
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

/// A record carrying every required field.
pub fn document(title: &str) -> Value {
    json!({
        "title": title,
        "img": format!("/uploads/2024/03/{title}.png"),
        "flag": "/images/EN_Co-fundedbytheEU_RGB_POS.png",
        "datecontent": "March 2024",
        "bllink": format!("/documents/{title}"),
        "permalink": format!("/uploads/2024/03/{title}.pdf"),
        "content": {
            "Published": "April 2024",
            "Description": "test document",
            "Countries": "Mali",
            "Themes": "Food security",
            "Scale": "Regional (West Africa)",
            "Langs": "English"
        }
    })
}
