//! Telemetry Ingestion Engine - Main Entry Point

use std::net::SocketAddr;

use anyhow::Result;
use tracing::info;

use telemetry_engine::api::{AppState, create_router};
use telemetry_engine::config::Config;
use telemetry_engine::ingest::Buffers;
use telemetry_engine::{db, retention, rollup};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_engine=info,tower_http=info".into()),
        )
        .json()
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting telemetry ingestion engine"
    );

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let buffers = Buffers::new(config.buffer_flush_size);

    let flush_timer = telemetry_engine::ingest::buffer::spawn_flush_timer(
        buffers.clone(),
        pool.clone(),
        std::time::Duration::from_millis(config.buffer_flush_interval_ms),
    );
    let rollup_task = rollup::spawn_rollup_task(pool.clone());
    let summary_task = rollup::spawn_summary_refresh_task(pool.clone());
    let retention_task = retention::spawn_retention_task(pool.clone(), config.retention_months);

    let state = AppState::new(pool.clone(), config.clone(), buffers.clone());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        info!("received shutdown signal, draining buffers");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    flush_timer.abort();
    rollup_task.abort();
    summary_task.abort();
    retention_task.abort();

    telemetry_engine::ingest::buffer::drain_on_shutdown(&buffers, &pool).await;
    info!("shutdown complete");

    Ok(())
}
