//! API router and shared application state.

pub mod handlers;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, FromRef};
use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::ingest::Buffers;

/// Maximum accepted ingestion payload size (SPEC_FULL.md §6).
const MAX_INGEST_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub buffers: Buffers,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl AppState {
    #[must_use]
    pub fn new(db: PgPool, config: Config, buffers: Buffers) -> Self {
        Self {
            db,
            config: Arc::new(config),
            buffers,
        }
    }
}

/// Build the application router.
///
/// No authentication middleware, no per-tenant routing — this engine sits
/// behind a trusted internal boundary (SPEC_FULL.md §4.7). `TraceLayer` and
/// `CompressionLayer` match the teacher's general router conventions.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ingest", post(handlers::ingest))
        .route("/api/buffer/status", get(handlers::buffer_status))
        .route("/api/devices/vehicles/{id}/live", get(handlers::vehicle_live))
        .route("/api/devices/meters/{id}/live", get(handlers::meter_live))
        .route(
            "/api/devices/vehicles/{id}/history",
            get(handlers::vehicle_history),
        )
        .route(
            "/api/devices/meters/{id}/history",
            get(handlers::meter_history),
        )
        .route(
            "/api/fleet/vehicles/summary",
            get(handlers::vehicle_fleet_summary),
        )
        .route("/api/fleet/meters/summary", get(handlers::meter_fleet_summary))
        .route(
            "/api/fleet/vehicles/dashboard",
            get(handlers::vehicle_fleet_dashboard),
        )
        .route(
            "/api/fleet/meters/dashboard",
            get(handlers::meter_fleet_dashboard),
        )
        .route(
            "/api/vehicles/{id}/performance",
            get(handlers::vehicle_performance),
        )
        .layer(DefaultBodyLimit::max(MAX_INGEST_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
