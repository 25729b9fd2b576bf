//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity, disk I/O and
//!   whether an upload bucket is configured

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, path::Path};
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Liveness check: always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness check that:
/// 1. Runs a lightweight query against SQLite (`SELECT 1`).
/// 2. Performs a best-effort write/read/delete under the storage `base_path`.
/// 3. Reports whether uploads are enabled (a bucket is configured).
///
/// HTTP 200 when the SQLite and disk checks pass, HTTP 503 otherwise. A
/// missing bucket is reported but does not fail readiness.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.storage.db)
        .await
    {
        Ok(1) => CheckStatus::ok(),
        Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    };

    let disk = disk_round_trip(&state.storage.base_path).await;

    let uploads = if state.issuer.is_configured() {
        CheckStatus::ok()
    } else {
        CheckStatus::failed("no upload bucket configured".into())
    };

    let overall_ok = sqlite.ok && disk.ok;
    let checks = HashMap::from([("sqlite", sqlite), ("disk", disk), ("uploads", uploads)]);

    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Write, read back and delete a temp file under `base`.
async fn disk_round_trip(base: &Path) -> CheckStatus {
    let tmp_path = base.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp_path, b"readyz").await {
        return CheckStatus::failed(format!("could not write tmp file: {}", e));
    }

    let read = fs::read(&tmp_path).await;
    let removed = fs::remove_file(&tmp_path).await;

    match (read, removed) {
        (Ok(bytes), Ok(())) if bytes == b"readyz" => CheckStatus::ok(),
        (Ok(bytes), Err(e)) if bytes == b"readyz" => CheckStatus {
            ok: true,
            error: Some(format!("could not remove tmp file: {}", e)),
        },
        (Ok(_), _) => CheckStatus::failed("file content mismatch".into()),
        (Err(e), _) => CheckStatus::failed(format!("could not read tmp file: {}", e)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
