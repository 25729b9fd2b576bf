mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{BUCKET, META_KEY, Options, document, spawn_app, spawn_app_with};
use docvault::{
    client::{ClientConfig, DocumentDraft, HttpTransport, SelectedFile, UploadState, Uploader},
    models::upload::{IssuedUrl, UploadRequest},
};
use reqwest::{StatusCode, header};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn presign_rejects_missing_fields() {
    let app = spawn_app().await;

    for body in [
        json!({}),
        json!({ "fileName": "a.pdf" }),
        json!({ "fileType": "application/pdf" }),
    ] {
        let res = app
            .client
            .post(app.url("/api/uploads/presign"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = res.json().await.unwrap();
        assert_eq!(
            body["error"],
            "Missing bucketName / fileName(key) / fileType(contentType)"
        );
    }
}

#[tokio::test]
async fn presign_rejects_malformed_body() {
    let app = spawn_app().await;
    let res = app
        .client
        .post(app.url("/api/uploads/presign"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Invalid request body");
}

#[tokio::test]
async fn presign_without_bucket_is_bad_request() {
    let app = spawn_app_with(Options {
        bucket: None,
        ..Options::default()
    })
    .await;
    let res = app
        .client
        .post(app.url("/api/uploads/presign"))
        .json(&UploadRequest::new("a.pdf", "application/pdf"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn presign_accepts_key_and_content_type_aliases() {
    let app = spawn_app().await;
    let res = app
        .client
        .post(app.url("/api/uploads/presign"))
        .json(&json!({ "key": "notes.pdf", "contentType": "application/pdf" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let issued: IssuedUrl = res.json().await.unwrap();
    assert_eq!(issued.object_key, "notes.pdf");
    assert_eq!(issued.expires_in_seconds, 300);
    assert!(issued.url.starts_with(&app.url(&format!("/storage/{BUCKET}/notes.pdf?"))));
    assert!(issued.url.contains("X-Amz-Expires=300"));
}

#[tokio::test]
async fn signing_failure_is_500_with_redacted_details() {
    let app = spawn_app_with(Options {
        secret_key: "",
        ..Options::default()
    })
    .await;
    let res = app
        .client
        .post(app.url("/api/uploads/presign"))
        .json(&UploadRequest::new("a.pdf", "application/pdf"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Failed to generate presigned URL");
    assert_eq!(body["details"], "internal error");
}

#[tokio::test]
async fn signing_failure_details_can_be_exposed() {
    let app = spawn_app_with(Options {
        secret_key: "",
        expose_error_details: true,
        ..Options::default()
    })
    .await;
    let res = app
        .client
        .post(app.url("/api/uploads/presign"))
        .json(&UploadRequest::new("a.pdf", "application/pdf"))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_ne!(body["details"], "internal error");
    assert!(body["details"].as_str().is_some_and(|d| !d.is_empty()));
}

#[tokio::test]
async fn responses_carry_cors_headers() {
    let app = spawn_app().await;

    let res = app
        .client
        .post(app.url("/api/uploads/presign"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS], "*");

    for path in ["/api/uploads/presign", "/api/documents"] {
        let res = app
            .client
            .request(reqwest::Method::OPTIONS, app.url(path))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "POST,OPTIONS"
        );
        assert!(res.text().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn end_to_end_upload_and_record() {
    let app = spawn_app().await;
    let payload: Vec<u8> = (0..2 * 1024 * 1024).map(|i| (i % 251) as u8).collect();

    let mut uploader = Uploader::new(
        HttpTransport::default(),
        ClientConfig {
            presign_url: Some(app.url("/api/uploads/presign")),
            meta_url: Some(app.url("/api/documents")),
        },
    );
    uploader
        .select_file(SelectedFile::new(
            "report.pdf",
            Some("application/pdf".into()),
            payload.clone(),
        ))
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let key = uploader
        .upload_at(now, move |pct| sink.lock().unwrap().push(pct))
        .await
        .unwrap();

    assert_eq!(key, "1700000000000_report.pdf");
    assert_eq!(
        uploader.state(),
        &UploadState::Success {
            uploaded_key: key.clone()
        }
    );
    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));

    let res = app
        .client
        .get(app.url(&format!("/storage/{BUCKET}/{key}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(res.bytes().await.unwrap().as_ref(), payload.as_slice());

    let before = app.documents().await.len();
    let mut draft = DocumentDraft::new("Annual report", "Yearly summary", Utc::now());
    draft.countries = vec!["Mali".into()];
    draft.themes = vec!["Food security".into()];
    draft.langs = vec!["English".into()];
    let submission = uploader.submit_metadata(&draft).await.unwrap();
    assert!(submission.is_recorded());
    let record = submission.record();

    let docs = app.documents().await;
    assert_eq!(docs.len(), before + 1);
    assert_eq!(docs.last().unwrap()["permalink"], record.permalink.as_str());
    assert_eq!(docs.last().unwrap()["sourceKey"], key.as_str());
}

#[tokio::test]
async fn presigned_url_only_authorizes_its_own_put() {
    let app = spawn_app().await;
    let issued: IssuedUrl = app
        .client
        .post(app.url("/api/uploads/presign"))
        .json(&UploadRequest::new("scan.pdf", "application/pdf"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let wrong_type = app
        .client
        .put(&issued.url)
        .header(header::CONTENT_TYPE, "image/png")
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_type.status(), StatusCode::FORBIDDEN);

    let other_key = issued.url.replacen("scan.pdf", "other.pdf", 1);
    let wrong_key = app
        .client
        .put(&other_key)
        .header(header::CONTENT_TYPE, "application/pdf")
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_key.status(), StatusCode::FORBIDDEN);

    let unsigned = app
        .client
        .put(app.url(&format!("/storage/{BUCKET}/scan.pdf")))
        .header(header::CONTENT_TYPE, "application/pdf")
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(unsigned.status(), StatusCode::FORBIDDEN);

    let head = app
        .client
        .head(app.url(&format!("/storage/{BUCKET}/scan.pdf")))
        .send()
        .await
        .unwrap();
    assert_eq!(head.status(), StatusCode::NOT_FOUND);

    let ok = app
        .client
        .put(&issued.url)
        .header(header::CONTENT_TYPE, "application/pdf")
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert!(ok.headers().contains_key(header::ETAG));
    assert!(ok.headers().contains_key("x-amz-version-id"));
}

#[tokio::test]
async fn expired_url_is_refused() {
    let app = spawn_app().await;
    let issued = app
        .state
        .issuer
        .issue_at(
            &UploadRequest::new("late.pdf", "application/pdf"),
            Utc::now() - Duration::seconds(301),
        )
        .unwrap();

    let res = app
        .client
        .put(&issued.url)
        .header(header::CONTENT_TYPE, "application/pdf")
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn record_validates_and_appends() {
    let app = spawn_app().await;

    let res = app
        .client
        .post(app.url("/api/documents"))
        .json(&document("first"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "ok": true }));

    let mut partial = document("second");
    partial.as_object_mut().unwrap().remove("bllink");
    partial["img"] = Value::Null;
    let res = app
        .client
        .post(app.url("/api/documents"))
        .json(&partial)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Missing required fields");
    assert_eq!(body["details"], json!(["img", "bllink"]));

    let res = app
        .client
        .post(app.url("/api/documents"))
        .body("{oops")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await.unwrap()["error"], "Invalid JSON body");

    let listed: Vec<Value> = app
        .client
        .get(app.url("/api/documents"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed, vec![document("first")]);
}

#[tokio::test]
async fn record_without_catalogue_is_500() {
    let app = spawn_app_with(Options {
        bucket: None,
        ..Options::default()
    })
    .await;
    let res = app
        .client
        .post(app.url("/api/documents"))
        .json(&document("orphan"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        res.json::<Value>().await.unwrap()["error"],
        "Failed to update metadata file"
    );
}

#[tokio::test]
async fn health_endpoints() {
    let app = spawn_app().await;
    let res = app.client.get(app.url("/healthz")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.client.get(app.url("/readyz")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
    assert_eq!(body["checks"]["uploads"]["ok"], true);
}

#[tokio::test]
async fn catalogue_cannot_be_overwritten_through_the_issuer() {
    let app = spawn_app().await;
    for title in ["one", "two", "three"] {
        let res = app
            .client
            .post(app.url("/api/documents"))
            .json(&document(title))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    for key in [META_KEY.to_string(), format!("/{META_KEY}")] {
        let res = app
            .client
            .post(app.url("/api/uploads/presign"))
            .json(&UploadRequest::new(key, "application/json"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            res.json::<Value>().await.unwrap()["error"],
            "Object key is reserved"
        );
    }

    assert_eq!(app.documents().await.len(), 3);
}

#[tokio::test]
async fn unsafe_key_is_refused_before_upload() {
    let app = spawn_app().await;
    let res = app
        .client
        .post(app.url("/api/uploads/presign"))
        .json(&UploadRequest::new("1700_report..v2.pdf", "application/pdf"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await.unwrap()["error"], "Invalid object key");
}

#[tokio::test]
async fn storage_answers_browser_preflight() {
    let app = spawn_app().await;
    let res = app
        .client
        .request(
            reqwest::Method::OPTIONS,
            app.url(&format!("/storage/{BUCKET}/uploads/x.pdf")),
        )
        .header(header::ORIGIN, "http://example.org")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS], "*");
    let methods = res.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap();
    assert!(methods.split(',').any(|m| m == "PUT"), "{methods}");
}
