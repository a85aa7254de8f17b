// Each integration test file is a separate binary; helpers not used in every
// binary would otherwise trigger dead_code warnings from clippy.
#![allow(dead_code)]

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;

use slipit_server::metadata::{FallbackPolicy, MetadataExtractor};
use slipit_server::router::create_router;
use slipit_server::state::AppState;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the full application router with the default (empty) fallbacks.
pub fn create_test_app() -> Router {
    create_test_app_with(FallbackPolicy::Empty, FETCH_TIMEOUT)
}

pub fn create_test_app_with(fallback: FallbackPolicy, fetch_timeout: Duration) -> Router {
    let extractor = MetadataExtractor::with_timeout(fetch_timeout, fallback)
        .expect("Failed to build extractor");
    create_router(
        AppState::new(extractor),
        CorsLayer::permissive(),
        REQUEST_TIMEOUT,
    )
}

/// `/fetchTitle` URI with `target` percent-encoded into the query.
pub fn fetch_title_uri(target: &str) -> String {
    format!("/fetchTitle?url={}", urlencoding::encode(target))
}

/// A URL on localhost where nothing is listening.
pub async fn refused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/")
}

/// A URL whose server accepts connections and closes them straight away,
/// without ever answering.
pub async fn hang_up_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });
    format!("http://127.0.0.1:{port}/")
}

// ── Request helpers ──────────────────────────────────────────────────────────

pub async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(app, req).await;
    (status, body)
}

pub async fn get_with_origin(app: Router, uri: &str, origin: &str) -> (StatusCode, HeaderMap) {
    let req = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::ORIGIN, origin)
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(app, req).await;
    (status, headers)
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}
