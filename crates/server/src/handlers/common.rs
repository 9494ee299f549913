//! Shared handler helpers: field validation and extractor rejections.

use crate::error::{ApiError, ApiResult};
use stitch_coordinator::CoordinatorError;
use stitch_core::{ChunkIndex, SessionRef};

/// Error for a required field that is absent or blank.
pub fn missing_field(field: &'static str) -> ApiError {
    CoordinatorError::InvalidInput {
        field,
        reason: "is required".to_string(),
    }
    .into()
}

/// A required field. Blank values count as absent.
pub fn required(field: &'static str, value: Option<String>) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| missing_field(field))
}

/// Build and validate the session identity from request fields.
pub fn session_ref(session_id: Option<String>, filename: Option<String>) -> ApiResult<SessionRef> {
    let session_id = required("sessionID", session_id)?;
    let filename = required("filename", filename)?;
    Ok(SessionRef::new(session_id, filename).map_err(CoordinatorError::from)?)
}

/// An optional non-negative integer field. Blank values count as absent.
pub fn optional_count(field: &'static str, raw: Option<&str>) -> ApiResult<Option<u64>> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => Ok(Some(
            ChunkIndex::parse(field, value)
                .map_err(CoordinatorError::from)?
                .get(),
        )),
        None => Ok(None),
    }
}

/// Parse a comma-separated list of chunk indices, e.g. `0,1,5`.
pub fn parse_index_list(field: &'static str, raw: &str) -> ApiResult<Vec<ChunkIndex>> {
    raw.split(',')
        .map(|part| ChunkIndex::parse(field, part).map_err(|e| ApiError::from(CoordinatorError::from(e))))
        .collect()
}

/// Map an axum extractor rejection to a JSON 400.
pub fn rejected(rejection: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest(rejection.to_string())
}
