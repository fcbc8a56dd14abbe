//! Domain entities for the telemetry ingestion pipeline.
//!
//! Design reference: SPEC_FULL.md §3 (Data Model).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

/// The two device classes this engine ingests. Each gets its own buffer,
/// repository, and reading/current table pair — see SPEC_FULL.md §9
/// ("per-class duplication is intentional").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Vehicle,
    Meter,
}

impl DeviceClass {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vehicle => "vehicle",
            Self::Meter => "meter",
        }
    }
}

/// A validated vehicle reading, ready to be pushed onto the vehicle buffer.
#[derive(Debug, Clone)]
pub struct VehicleReadingInput {
    pub vehicle_id: String,
    pub soc: Decimal,
    pub kwh_delivered_dc: Decimal,
    pub battery_temp: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// A validated meter reading, ready to be pushed onto the meter buffer.
#[derive(Debug, Clone)]
pub struct MeterReadingInput {
    pub meter_id: String,
    pub kwh_consumed_ac: Decimal,
    pub voltage: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// A persisted row from `vehicle_readings`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VehicleReadingRow {
    pub vehicle_id: String,
    pub soc: Decimal,
    pub kwh_delivered_dc: Decimal,
    pub battery_temp: Decimal,
    pub recorded_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

/// A persisted row from `meter_readings`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MeterReadingRow {
    pub meter_id: String,
    pub kwh_consumed_ac: Decimal,
    pub voltage: Decimal,
    pub recorded_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

/// Latest known state for a vehicle — the hot-store row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VehicleCurrentRow {
    pub vehicle_id: String,
    pub soc: Decimal,
    pub kwh_delivered_dc: Decimal,
    pub battery_temp: Decimal,
    pub last_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Latest known state for a meter — the hot-store row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MeterCurrentRow {
    pub meter_id: String,
    pub kwh_consumed_ac: Decimal,
    pub voltage: Decimal,
    pub last_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A vehicle's link to the meter at its charging station.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VehicleMeterLinkRow {
    pub vehicle_id: String,
    pub meter_id: String,
    pub linked_at: DateTime<Utc>,
}

/// One hour bucket of per-vehicle aggregate stats.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VehicleHourlyStatsRow {
    pub vehicle_id: String,
    pub hour_bucket: DateTime<Utc>,
    pub sample_count: i64,
    pub avg_dc_kwh: Decimal,
    pub min_dc_kwh: Decimal,
    pub max_dc_kwh: Decimal,
}

/// One hour bucket of per-meter aggregate stats.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MeterHourlyStatsRow {
    pub meter_id: String,
    pub hour_bucket: DateTime<Utc>,
    pub sample_count: i64,
    pub avg_ac_kwh: Decimal,
    pub min_ac_kwh: Decimal,
    pub max_ac_kwh: Decimal,
}

/// The materialized 24h efficiency summary for one vehicle.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VehiclePerformanceSummaryRow {
    pub vehicle_id: String,
    pub meter_id: String,
    pub total_dc_delivered: Decimal,
    pub total_ac_consumed: Decimal,
    pub efficiency_pct: Decimal,
    pub refreshed_at: DateTime<Utc>,
}

/// Combined efficiency result served by the performance read contract,
/// whichever source (materialized summary or live aggregation) produced it.
#[derive(Debug, Clone, Serialize)]
pub struct VehiclePerformance {
    pub vehicle_id: String,
    pub meter_id: String,
    pub total_dc_delivered: Decimal,
    pub total_ac_consumed: Decimal,
    pub efficiency_pct: Decimal,
}

/// Efficiency ratio = 100 * dc_delivered / ac_consumed, rounded to 2 decimal
/// places; 0 when the denominator is zero. SPEC_FULL.md §4.5.
pub fn efficiency_ratio(total_dc_delivered: Decimal, total_ac_consumed: Decimal) -> Decimal {
    if total_ac_consumed.is_zero() {
        return Decimal::ZERO;
    }
    (Decimal::from(100) * total_dc_delivered / total_ac_consumed).round_dp(2)
}
