//! Fleet-wide read contracts: range summaries and the last-24h dashboard,
//! both served from the hourly rollup tables.
//!
//! Design reference: SPEC_FULL.md §4.5 ("Fleet summary (range)",
//! "Last-24h dashboard (per class)").

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::model::{MeterHourlyStatsRow, VehicleHourlyStatsRow};

/// Fleet-wide vehicle stats with `hour_bucket` in `[from, to)`.
#[tracing::instrument(skip(pool))]
pub async fn vehicle_summary(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> sqlx::Result<Vec<VehicleHourlyStatsRow>> {
    sqlx::query_as(
        "SELECT vehicle_id, hour_bucket, sample_count, avg_dc_kwh, min_dc_kwh, max_dc_kwh \
         FROM vehicle_hourly_stats \
         WHERE hour_bucket >= $1 AND hour_bucket < $2 \
         ORDER BY hour_bucket",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Fleet-wide meter stats with `hour_bucket` in `[from, to)`.
#[tracing::instrument(skip(pool))]
pub async fn meter_summary(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> sqlx::Result<Vec<MeterHourlyStatsRow>> {
    sqlx::query_as(
        "SELECT meter_id, hour_bucket, sample_count, avg_ac_kwh, min_ac_kwh, max_ac_kwh \
         FROM meter_hourly_stats \
         WHERE hour_bucket >= $1 AND hour_bucket < $2 \
         ORDER BY hour_bucket",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Vehicle stats for the trailing 24 hours, for the fleet dashboard.
#[tracing::instrument(skip(pool))]
pub async fn vehicle_dashboard(pool: &PgPool) -> sqlx::Result<Vec<VehicleHourlyStatsRow>> {
    vehicle_summary(pool, Utc::now() - Duration::hours(24), Utc::now()).await
}

/// Meter stats for the trailing 24 hours, for the fleet dashboard.
#[tracing::instrument(skip(pool))]
pub async fn meter_dashboard(pool: &PgPool) -> sqlx::Result<Vec<MeterHourlyStatsRow>> {
    meter_summary(pool, Utc::now() - Duration::hours(24), Utc::now()).await
}
