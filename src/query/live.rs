//! Live status read contract: a point lookup against the hot store.
//!
//! Design reference: SPEC_FULL.md §4.5 ("Live status (one device)").

use sqlx::PgPool;

use crate::model::{MeterCurrentRow, VehicleCurrentRow};

/// Fetch the current row for a vehicle. `None` if the vehicle has never been
/// seen — not an error; the caller maps this to a `200` with `null`.
#[tracing::instrument(skip(pool))]
pub async fn vehicle_live(pool: &PgPool, vehicle_id: &str) -> sqlx::Result<Option<VehicleCurrentRow>> {
    sqlx::query_as(
        "SELECT vehicle_id, soc, kwh_delivered_dc, battery_temp, last_seen_at, updated_at \
         FROM vehicle_current WHERE vehicle_id = $1",
    )
    .bind(vehicle_id)
    .fetch_optional(pool)
    .await
}

/// Fetch the current row for a meter. `None` if never seen.
#[tracing::instrument(skip(pool))]
pub async fn meter_live(pool: &PgPool, meter_id: &str) -> sqlx::Result<Option<MeterCurrentRow>> {
    sqlx::query_as(
        "SELECT meter_id, kwh_consumed_ac, voltage, last_seen_at, updated_at \
         FROM meter_current WHERE meter_id = $1",
    )
    .bind(meter_id)
    .fetch_optional(pool)
    .await
}
