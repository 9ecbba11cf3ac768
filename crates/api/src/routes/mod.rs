//! HTTP route handlers.

pub mod catalog;
pub mod establishments;
pub mod health;
pub mod metrics;
pub mod orders;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a UUID-backed identifier from a path segment.
fn parse_id<T: FromStr<Err = uuid::Error>>(id: &str) -> Result<T, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
