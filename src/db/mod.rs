//! Database Layer
//!
//! `PostgreSQL` connection pool and migrations.

use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool};
use std::str::FromStr;
use tracing::info;

use crate::config::Config;

/// Create the `PostgreSQL` connection pool.
///
/// Every acquired connection has its `statement_timeout` set per
/// [`Config::statement_timeout_ms`] (SPEC_FULL.md §5): a runaway query is
/// aborted at the database rather than hanging a buffer flush indefinitely.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    let statement_timeout_ms = config.statement_timeout_ms;
    let connect_options = PgConnectOptions::from_str(&config.database_url)?;

    let pool = PgPoolOptions::new()
        .min_connections(config.database_pool_min)
        .max_connections(config.database_pool_max)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET statement_timeout = {statement_timeout_ms}").as_str())
                    .await?;
                Ok(())
            })
        })
        .connect_with(connect_options)
        .await?;

    info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations completed");
    Ok(())
}
