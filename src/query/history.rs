//! History range read contract: a time-windowed scan of one device's cold
//! store rows.
//!
//! Design reference: SPEC_FULL.md §4.5 ("History range (one device)").

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::QueryError;
use crate::model::{MeterReadingRow, VehicleReadingRow};

/// Default and maximum row count for a history query, mirroring the
/// teacher's page-size ceilings on its own time-range scans.
const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

/// A validated `[from, to)` window with a clamped row limit.
pub struct HistoryWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub limit: i64,
}

impl HistoryWindow {
    /// Validate a `from`/`to`/`limit` triple from query parameters. Both
    /// `from` and `to` are required; `to` must not precede `from`. `limit`
    /// is clamped to `[1, MAX_LIMIT]`, defaulting to `DEFAULT_LIMIT`.
    pub fn parse(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Self, QueryError> {
        let (from, to) = match (from, to) {
            (Some(from), Some(to)) => (from, to),
            _ => return Err(QueryError::MissingTimeRange),
        };
        if from > to {
            return Err(QueryError::InvalidTimeRange);
        }
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Ok(Self { from, to, limit })
    }
}

/// Fetch a vehicle's history rows within the window, latest first.
#[tracing::instrument(skip(pool))]
pub async fn vehicle_history(
    pool: &PgPool,
    vehicle_id: &str,
    window: &HistoryWindow,
) -> sqlx::Result<Vec<VehicleReadingRow>> {
    sqlx::query_as(
        "SELECT vehicle_id, soc, kwh_delivered_dc, battery_temp, recorded_at, ingested_at \
         FROM vehicle_readings \
         WHERE vehicle_id = $1 AND recorded_at >= $2 AND recorded_at < $3 \
         ORDER BY recorded_at DESC \
         LIMIT $4",
    )
    .bind(vehicle_id)
    .bind(window.from)
    .bind(window.to)
    .bind(window.limit)
    .fetch_all(pool)
    .await
}

/// Fetch a meter's history rows within the window, latest first.
#[tracing::instrument(skip(pool))]
pub async fn meter_history(
    pool: &PgPool,
    meter_id: &str,
    window: &HistoryWindow,
) -> sqlx::Result<Vec<MeterReadingRow>> {
    sqlx::query_as(
        "SELECT meter_id, kwh_consumed_ac, voltage, recorded_at, ingested_at \
         FROM meter_readings \
         WHERE meter_id = $1 AND recorded_at >= $2 AND recorded_at < $3 \
         ORDER BY recorded_at DESC \
         LIMIT $4",
    )
    .bind(meter_id)
    .bind(window.from)
    .bind(window.to)
    .bind(window.limit)
    .fetch_all(pool)
    .await
}
