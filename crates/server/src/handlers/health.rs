//! Health check endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;
use stitch_storage::StorageError;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
}

/// GET /health - Verify the blob store is reachable.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let limit = state.config.upload.store_timeout();
    match tokio::time::timeout(limit, state.storage.health_check()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "storage health check timed out",
            ))
            .into());
        }
    }

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.storage.backend_name(),
    }))
}
