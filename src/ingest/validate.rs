//! Wire payloads and field-level validation for the ingestion endpoint.
//!
//! Design reference: SPEC_FULL.md §4.4 (Validation).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::error::IngestError;
use crate::model::{MeterReadingInput, VehicleReadingInput};

/// A single ingestion request: a discriminated union of the two device
/// classes this engine accepts. Adjacently tagged so the wire shape matches
/// `{"type": "VEHICLE", "payload": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "UPPERCASE")]
pub enum IngestRequest {
    Vehicle(VehiclePayload),
    Meter(MeterPayload),
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct VehiclePayload {
    #[validate(length(min = 1, max = 64, message = "vehicle_id must be 1-64 characters"))]
    pub vehicle_id: String,
    #[validate(custom(function = "validate_soc"))]
    pub soc: Decimal,
    #[validate(custom(function = "validate_non_negative"))]
    pub kwh_delivered_dc: Decimal,
    pub battery_temp: Decimal,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct MeterPayload {
    #[validate(length(min = 1, max = 64, message = "meter_id must be 1-64 characters"))]
    pub meter_id: String,
    #[validate(custom(function = "validate_non_negative"))]
    pub kwh_consumed_ac: Decimal,
    #[validate(custom(function = "validate_non_negative"))]
    pub voltage: Decimal,
    pub recorded_at: DateTime<Utc>,
}

fn validate_soc(value: &Decimal) -> Result<(), validator::ValidationError> {
    if *value >= Decimal::ZERO && *value <= Decimal::from(100) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("soc must be between 0 and 100"))
    }
}

fn validate_non_negative(value: &Decimal) -> Result<(), validator::ValidationError> {
    if *value >= Decimal::ZERO {
        Ok(())
    } else {
        Err(validator::ValidationError::new("value must not be negative"))
    }
}

/// The outcome of a successful parse + validation, ready for the buffer.
pub enum ParsedReading {
    Vehicle(VehicleReadingInput),
    Meter(MeterReadingInput),
}

/// Parse and validate a raw ingestion request body.
///
/// Unknown discriminators, unknown fields, and type mismatches surface as
/// [`IngestError::Malformed`]; constraint violations surface as
/// [`IngestError::Validation`]. Neither ever reaches a buffer.
pub fn parse_and_validate(body: &[u8]) -> Result<ParsedReading, IngestError> {
    let request: IngestRequest =
        serde_json::from_slice(body).map_err(|e| IngestError::Malformed(e.to_string()))?;

    match request {
        IngestRequest::Vehicle(payload) => {
            payload
                .validate()
                .map_err(|e| IngestError::Validation(e.to_string()))?;
            Ok(ParsedReading::Vehicle(VehicleReadingInput {
                vehicle_id: payload.vehicle_id,
                soc: payload.soc,
                kwh_delivered_dc: payload.kwh_delivered_dc,
                battery_temp: payload.battery_temp,
                recorded_at: payload.recorded_at,
            }))
        }
        IngestRequest::Meter(payload) => {
            payload
                .validate()
                .map_err(|e| IngestError::Validation(e.to_string()))?;
            Ok(ParsedReading::Meter(MeterReadingInput {
                meter_id: payload.meter_id,
                kwh_consumed_ac: payload.kwh_consumed_ac,
                voltage: payload.voltage,
                recorded_at: payload.recorded_at,
            }))
        }
    }
}
