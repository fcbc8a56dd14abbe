//! Write path: payload validation, batching buffers, and batch persistence.

pub mod buffer;
pub mod repository;
pub mod validate;

pub use buffer::Buffers;
pub use validate::{parse_and_validate, ParsedReading};
