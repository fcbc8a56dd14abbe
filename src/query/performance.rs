//! Vehicle 24h performance read contract: resolve the vehicle's meter link,
//! then prefer the materialized summary over a live cold-store aggregation.
//!
//! Design reference: SPEC_FULL.md §4.5 ("Vehicle 24h performance") and the
//! Open Question resolution in DESIGN.md.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::error::QueryError;
use crate::model::{self, VehiclePerformance};

/// Resolve a vehicle's 24h efficiency, preferring the materialized
/// `vehicle_performance_summary` row and falling back to a live aggregation
/// over the last 24h of cold-store data when no summary row exists yet
/// (e.g. a vehicle linked within the last rollup cycle).
///
/// Returns [`QueryError::NotLinked`] if the vehicle has no meter link at all.
#[tracing::instrument(skip(pool))]
pub async fn vehicle_performance(
    pool: &PgPool,
    vehicle_id: &str,
) -> Result<VehiclePerformance, QueryError> {
    let meter_id: Option<String> =
        sqlx::query_scalar("SELECT meter_id FROM vehicle_meter_link WHERE vehicle_id = $1")
            .bind(vehicle_id)
            .fetch_optional(pool)
            .await?;
    let meter_id = meter_id.ok_or(QueryError::NotLinked)?;

    if let Some(summary) = fetch_summary(pool, vehicle_id).await? {
        return Ok(VehiclePerformance {
            vehicle_id: summary.vehicle_id,
            meter_id: summary.meter_id,
            total_dc_delivered: summary.total_dc_delivered,
            total_ac_consumed: summary.total_ac_consumed,
            efficiency_pct: summary.efficiency_pct,
        });
    }

    live_aggregate(pool, vehicle_id, &meter_id).await
}

async fn fetch_summary(
    pool: &PgPool,
    vehicle_id: &str,
) -> sqlx::Result<Option<model::VehiclePerformanceSummaryRow>> {
    sqlx::query_as(
        "SELECT vehicle_id, meter_id, total_dc_delivered, total_ac_consumed, efficiency_pct, refreshed_at \
         FROM vehicle_performance_summary WHERE vehicle_id = $1",
    )
    .bind(vehicle_id)
    .fetch_optional(pool)
    .await
}

async fn live_aggregate(
    pool: &PgPool,
    vehicle_id: &str,
    meter_id: &str,
) -> Result<VehiclePerformance, QueryError> {
    let since = Utc::now() - Duration::hours(24);

    let total_dc_delivered: Option<Decimal> = sqlx::query_scalar(
        "SELECT sum(kwh_delivered_dc) FROM vehicle_readings \
         WHERE vehicle_id = $1 AND recorded_at >= $2",
    )
    .bind(vehicle_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    let total_dc_delivered = total_dc_delivered.unwrap_or(Decimal::ZERO);

    let total_ac_consumed: Option<Decimal> = sqlx::query_scalar(
        "SELECT sum(kwh_consumed_ac) FROM meter_readings \
         WHERE meter_id = $1 AND recorded_at >= $2",
    )
    .bind(meter_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    let total_ac_consumed = total_ac_consumed.unwrap_or(Decimal::ZERO);

    let efficiency_pct = model::efficiency_ratio(total_dc_delivered, total_ac_consumed);

    Ok(VehiclePerformance {
        vehicle_id: vehicle_id.to_string(),
        meter_id: meter_id.to_string(),
        total_dc_delivered,
        total_ac_consumed,
        efficiency_pct,
    })
}
