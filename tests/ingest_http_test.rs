//! HTTP integration tests for the ingestion and read endpoints.
//!
//! Run with: `cargo test --test ingest_http_test -- --nocapture`

mod helpers;

use axum::body::Body;
use axum::http::Method;
use helpers::{body_to_json, TestApp};
use sqlx::PgPool;

#[sqlx::test]
async fn ingest_accepts_a_valid_vehicle_reading(pool: PgPool) {
    let app = TestApp::new(pool);

    let req = TestApp::request(Method::POST, "/api/ingest")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"type":"VEHICLE","payload":{
                "vehicle_id":"v-1","soc":"80.0","kwh_delivered_dc":"5.0",
                "battery_temp":"28.0","recorded_at":"2026-07-26T10:00:00Z"
            }}"#,
        ))
        .unwrap();

    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), 202);
    let body = body_to_json(resp).await;
    assert_eq!(body["accepted"], true);
}

#[sqlx::test]
async fn ingest_rejects_malformed_payload(pool: PgPool) {
    let app = TestApp::new(pool);

    let req = TestApp::request(Method::POST, "/api/ingest")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"type":"NOT_A_CLASS","payload":{}}"#))
        .unwrap();

    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), 400);
}

#[sqlx::test]
async fn ingest_rejects_out_of_range_soc(pool: PgPool) {
    let app = TestApp::new(pool);

    let req = TestApp::request(Method::POST, "/api/ingest")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"type":"VEHICLE","payload":{
                "vehicle_id":"v-1","soc":"250.0","kwh_delivered_dc":"5.0",
                "battery_temp":"28.0","recorded_at":"2026-07-26T10:00:00Z"
            }}"#,
        ))
        .unwrap();

    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), 400);
}

#[sqlx::test]
async fn buffer_status_reports_depth_after_ingest(pool: PgPool) {
    let app = TestApp::new(pool);

    let req = TestApp::request(Method::POST, "/api/ingest")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"type":"METER","payload":{
                "meter_id":"m-1","kwh_consumed_ac":"3.0","voltage":"230.0",
                "recorded_at":"2026-07-26T10:00:00Z"
            }}"#,
        ))
        .unwrap();
    app.oneshot(req).await;

    let req = TestApp::request(Method::GET, "/api/buffer/status")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), 200);
    let body = body_to_json(resp).await;
    assert_eq!(body["meters"], 1);
    assert_eq!(body["vehicles"], 0);
}

#[sqlx::test]
async fn vehicle_live_returns_null_for_unknown_device(pool: PgPool) {
    let app = TestApp::new(pool);

    let req = TestApp::request(Method::GET, "/api/devices/vehicles/unknown-v/live")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), 200);
    let body = body_to_json(resp).await;
    assert!(body.is_null());
}

#[sqlx::test]
async fn vehicle_history_requires_from_and_to(pool: PgPool) {
    let app = TestApp::new(pool);

    let req = TestApp::request(Method::GET, "/api/devices/vehicles/v-1/history")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), 400);
}

#[sqlx::test]
async fn vehicle_history_with_equal_bounds_is_empty_not_error(pool: PgPool) {
    let app = TestApp::new(pool);

    let req = TestApp::request(
        Method::GET,
        "/api/devices/vehicles/v-1/history?from=2026-07-26T00:00:00Z&to=2026-07-26T00:00:00Z",
    )
    .body(Body::empty())
    .unwrap();
    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), 200);
    let body = body_to_json(resp).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[sqlx::test]
async fn vehicle_performance_404s_for_unlinked_vehicle(pool: PgPool) {
    let app = TestApp::new(pool);

    let req = TestApp::request(Method::GET, "/api/vehicles/unlinked-v/performance")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), 404);
}
