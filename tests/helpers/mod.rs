//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for building and sending requests through the full
//! axum router.

use axum::{
    body::Body,
    http::{self, Method, Request, Response},
    Router,
};
use http_body_util::BodyExt;
use sqlx::PgPool;

use telemetry_engine::{
    api::{create_router, AppState},
    config::Config,
    ingest::Buffers,
};
use tower::ServiceExt;

/// A test application wrapping the full axum router over a given pool.
///
/// Callers provide a `PgPool` obtained via `#[sqlx::test]` so each test runs
/// against its own migrated, ephemeral database.
pub struct TestApp {
    pub router: Router,
    pub pool: PgPool,
}

impl TestApp {
    /// Build a test app over an already-migrated pool.
    pub fn new(pool: PgPool) -> Self {
        let config = Config::default_for_test();
        let buffers = Buffers::new(config.buffer_flush_size);
        let state = AppState::new(pool.clone(), config, buffers);
        let router = create_router(state);
        Self { router, pool }
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("failed to parse response as JSON: {e}\nBody: {preview}")
    })
}
