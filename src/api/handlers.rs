//! Request handlers for the ingestion, buffer-status, and read endpoints.
//!
//! Design reference: SPEC_FULL.md §6 (External Interfaces).

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::error::{IngestError, QueryError};
use crate::ingest::{parse_and_validate, ParsedReading};
use crate::model::{MeterCurrentRow, MeterReadingRow, VehicleCurrentRow, VehicleReadingRow};
use crate::query::{fleet, history, live, performance, HistoryWindow};

/// `POST /api/ingest` — validate and buffer a single reading. Returns 202
/// once the record is pushed onto its class's buffer; persistence happens
/// asynchronously on the next flush.
pub async fn ingest(State(state): State<AppState>, body: Bytes) -> Result<Response, IngestError> {
    let parsed = parse_and_validate(&body)?;

    match parsed {
        ParsedReading::Vehicle(reading) => {
            if state.buffers.vehicle.push(reading).await {
                let buffer = state.buffers.vehicle.clone();
                let pool = state.db.clone();
                tokio::spawn(async move {
                    crate::ingest::buffer::flush_vehicle(&buffer, &pool).await;
                });
            }
        }
        ParsedReading::Meter(reading) => {
            if state.buffers.meter.push(reading).await {
                let buffer = state.buffers.meter.clone();
                let pool = state.db.clone();
                tokio::spawn(async move {
                    crate::ingest::buffer::flush_meter(&buffer, &pool).await;
                });
            }
        }
    }

    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))).into_response())
}

#[derive(Serialize)]
pub struct BufferStatus {
    vehicles: usize,
    meters: usize,
}

/// `GET /api/buffer/status` — current per-class buffer depth, the
/// backpressure signal from SPEC_FULL.md §4.3.
pub async fn buffer_status(State(state): State<AppState>) -> Json<BufferStatus> {
    Json(BufferStatus {
        vehicles: state.buffers.vehicle.depth().await,
        meters: state.buffers.meter.depth().await,
    })
}

/// `GET /api/devices/vehicles/{id}/live` — `null` if the vehicle is unknown.
pub async fn vehicle_live(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Option<VehicleCurrentRow>>, QueryError> {
    Ok(Json(live::vehicle_live(&state.db, &id).await?))
}

/// `GET /api/devices/meters/{id}/live` — `null` if the meter is unknown.
pub async fn meter_live(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Option<MeterCurrentRow>>, QueryError> {
    Ok(Json(live::meter_live(&state.db, &id).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    limit: Option<i64>,
}

/// `GET /api/devices/vehicles/{id}/history` — `from`/`to` are required.
pub async fn vehicle_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<VehicleReadingRow>>, QueryError> {
    let window = HistoryWindow::parse(q.from, q.to, q.limit)?;
    Ok(Json(history::vehicle_history(&state.db, &id, &window).await?))
}

/// `GET /api/devices/meters/{id}/history` — `from`/`to` are required.
pub async fn meter_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<MeterReadingRow>>, QueryError> {
    let window = HistoryWindow::parse(q.from, q.to, q.limit)?;
    Ok(Json(history::meter_history(&state.db, &id, &window).await?))
}

#[derive(Debug, Deserialize)]
pub struct FleetSummaryQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

/// `GET /api/fleet/vehicles/summary` — `hour_bucket` in `[from, to)`.
pub async fn vehicle_fleet_summary(
    State(state): State<AppState>,
    Query(q): Query<FleetSummaryQuery>,
) -> Result<Json<Vec<crate::model::VehicleHourlyStatsRow>>, QueryError> {
    let (from, to) = match (q.from, q.to) {
        (Some(from), Some(to)) => (from, to),
        _ => return Err(QueryError::MissingTimeRange),
    };
    if from > to {
        return Err(QueryError::InvalidTimeRange);
    }
    Ok(Json(fleet::vehicle_summary(&state.db, from, to).await?))
}

/// `GET /api/fleet/meters/summary` — `hour_bucket` in `[from, to)`.
pub async fn meter_fleet_summary(
    State(state): State<AppState>,
    Query(q): Query<FleetSummaryQuery>,
) -> Result<Json<Vec<crate::model::MeterHourlyStatsRow>>, QueryError> {
    let (from, to) = match (q.from, q.to) {
        (Some(from), Some(to)) => (from, to),
        _ => return Err(QueryError::MissingTimeRange),
    };
    if from > to {
        return Err(QueryError::InvalidTimeRange);
    }
    Ok(Json(fleet::meter_summary(&state.db, from, to).await?))
}

/// `GET /api/fleet/vehicles/dashboard` — trailing 24h, grouped by hour.
pub async fn vehicle_fleet_dashboard(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::model::VehicleHourlyStatsRow>>, QueryError> {
    Ok(Json(fleet::vehicle_dashboard(&state.db).await?))
}

/// `GET /api/fleet/meters/dashboard` — trailing 24h, grouped by hour.
pub async fn meter_fleet_dashboard(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::model::MeterHourlyStatsRow>>, QueryError> {
    Ok(Json(fleet::meter_dashboard(&state.db).await?))
}

/// `GET /api/vehicles/{id}/performance` — unlinked vehicle → 404.
pub async fn vehicle_performance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::model::VehiclePerformance>, QueryError> {
    Ok(Json(performance::vehicle_performance(&state.db, &id).await?))
}
