//! Permissive CORS: every response may be read from any origin, and the
//! JSON endpoints answer preflight requests directly.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// Response middleware adding `Access-Control-Allow-Origin: *` and
/// `Access-Control-Allow-Headers: *`.
pub async fn with_cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    response
}

/// `OPTIONS` on a JSON endpoint: 200 with an empty body.
pub async fn preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST,OPTIONS"),
        )],
    )
}

/// `OPTIONS` on an object URL, sent by browsers before a presigned PUT.
pub async fn storage_preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("PUT,GET,HEAD,OPTIONS"),
        )],
    )
}
