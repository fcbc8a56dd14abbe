//! Crate-wide error types for the ingestion and read APIs.
//!
//! Design reference: SPEC_FULL.md §7 (Error Handling Design).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors surfaced by validation and dispatch (SPEC_FULL.md §4.4).
///
/// Always client-visible (400) and never retried — the record never reached
/// a buffer.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The request body failed to deserialize: unknown discriminator,
    /// unknown field, or a type mismatch.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// The payload deserialized but failed field-level validation.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "validation_failed", "message": message })),
        )
            .into_response()
    }
}

/// Errors surfaced by the analytics read API (SPEC_FULL.md §4.5, §7).
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A history/summary query was missing a required time range.
    #[error("from and to are required")]
    MissingTimeRange,

    /// `from` is not strictly before `to`.
    #[error("from must be before to")]
    InvalidTimeRange,

    /// The requested vehicle has no current meter link.
    #[error("vehicle has no linked meter")]
    NotLinked,

    /// A database error occurred while serving the query.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::MissingTimeRange | Self::InvalidTimeRange => {
                (StatusCode::BAD_REQUEST, "invalid_time_range")
            }
            Self::NotLinked => (StatusCode::NOT_FOUND, "not_linked"),
            Self::Database(e) => {
                tracing::error!(error = %e, "read API database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
            }
        };
        let message = self.to_string();
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}
