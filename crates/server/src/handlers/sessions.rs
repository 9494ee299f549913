//! Session endpoints: status, merge, purge and artifact download.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{optional_count, parse_index_list, rejected, session_ref};
use crate::metrics::{
    MERGE_CLEANUP_FAILURES, MERGE_DURATION, MERGED_BYTES, MERGES_COMPLETED, record_merge_failure,
};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use stitch_coordinator::{CoordinatorError, MergePlan};
use stitch_core::SessionRef;

/// Session identity, as a query string or form body.
#[derive(Debug, Default, Deserialize)]
pub struct SessionParams {
    #[serde(rename = "sessionID", alias = "upload_id")]
    pub session_id: Option<String>,
    pub filename: Option<String>,
}

impl SessionParams {
    fn session(self) -> ApiResult<SessionRef> {
        session_ref(self.session_id, self.filename)
    }
}

/// Status query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct StatusParams {
    #[serde(rename = "sessionID", alias = "upload_id")]
    pub session_id: Option<String>,
    pub filename: Option<String>,
    #[serde(rename = "expectedTotal", alias = "total_parts")]
    pub expected_total: Option<String>,
}

/// Status response. `uploaded` without `expectedTotal`, `missing` with it.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<Vec<u64>>,
    #[serde(rename = "expectedTotal", skip_serializing_if = "Option::is_none")]
    pub expected_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<u64>>,
}

/// GET /status - Chunk status from the query string.
pub async fn get_status(
    State(state): State<AppState>,
    query: Result<Query<StatusParams>, QueryRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Query(params) = query.map_err(rejected)?;
    upload_status(&state, params).await.map(Json)
}

/// POST /status - Chunk status from a form body.
pub async fn post_status(
    State(state): State<AppState>,
    form: Result<Form<StatusParams>, FormRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Form(params) = form.map_err(rejected)?;
    upload_status(&state, params).await.map(Json)
}

async fn upload_status(state: &AppState, params: StatusParams) -> ApiResult<StatusResponse> {
    let expected_total = optional_count("expectedTotal", params.expected_total.as_deref())?;
    let session = session_ref(params.session_id, params.filename)?;

    let (uploaded, missing) = match expected_total {
        Some(total) => {
            let missing = state.coordinator.missing(&session, total).await?;
            (None, Some(missing.into_iter().map(|i| i.get()).collect()))
        }
        None => {
            let uploaded = state.coordinator.list_uploaded(&session).await?;
            (Some(uploaded.into_iter().map(|i| i.get()).collect()), None)
        }
    };

    Ok(StatusResponse {
        session_id: session.session_id().to_string(),
        filename: session.filename().to_string(),
        uploaded,
        expected_total,
        missing,
    })
}

/// Merge form fields. `expectedTotal` and `chunks` are mutually exclusive;
/// with neither, every present chunk is merged.
#[derive(Debug, Default, Deserialize)]
pub struct MergeParams {
    #[serde(rename = "sessionID", alias = "upload_id")]
    pub session_id: Option<String>,
    pub filename: Option<String>,
    #[serde(rename = "expectedTotal", alias = "total_parts")]
    pub expected_total: Option<String>,
    pub chunks: Option<String>,
}

impl MergeParams {
    fn plan(&self) -> ApiResult<MergePlan> {
        let expected_total = optional_count("expectedTotal", self.expected_total.as_deref())?;
        let listed = self
            .chunks
            .as_deref()
            .filter(|raw| !raw.trim().is_empty());

        match (expected_total, listed) {
            (Some(_), Some(_)) => Err(CoordinatorError::InvalidInput {
                field: "chunks",
                reason: "cannot be combined with expectedTotal".to_string(),
            }
            .into()),
            (Some(total), None) => Ok(MergePlan::Expected(total)),
            (None, Some(raw)) => Ok(MergePlan::Listed(parse_index_list("chunks", raw)?)),
            (None, None) => Ok(MergePlan::AsPresent),
        }
    }
}

/// A chunk left behind by post-merge cleanup.
#[derive(Debug, Serialize)]
pub struct CleanupFailureBody {
    pub key: String,
    pub error: String,
}

/// Merge response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    pub message: String,
    pub key: String,
    pub size: u64,
    pub chunks: usize,
    pub cleanup_failures: Vec<CleanupFailureBody>,
}

/// POST /merge - Concatenate a session's chunks into its merged artifact.
pub async fn merge_upload(
    State(state): State<AppState>,
    form: Result<Form<MergeParams>, FormRejection>,
) -> ApiResult<Json<MergeResponse>> {
    let Form(params) = form.map_err(rejected)?;
    let start_time = Instant::now();

    let result = run_merge(&state, params).await;
    match &result {
        Ok(response) => {
            MERGES_COMPLETED.inc();
            MERGED_BYTES.inc_by(response.size);
            MERGE_CLEANUP_FAILURES.inc_by(response.cleanup_failures.len() as u64);
            MERGE_DURATION.observe(start_time.elapsed().as_secs_f64());
        }
        Err(e) => record_merge_failure(e.code()),
    }
    result.map(Json)
}

async fn run_merge(state: &AppState, params: MergeParams) -> ApiResult<MergeResponse> {
    let plan = params.plan()?;
    let session = session_ref(params.session_id, params.filename)?;

    let outcome = state.coordinator.merge(&session, &plan).await?;
    let message = if outcome.cleanup_failures.is_empty() {
        format!("Merged {} chunks", outcome.chunks)
    } else {
        format!(
            "Merged {} chunks, {} could not be cleaned up",
            outcome.chunks,
            outcome.cleanup_failures.len()
        )
    };

    Ok(MergeResponse {
        message,
        key: outcome.key,
        size: outcome.bytes,
        chunks: outcome.chunks,
        cleanup_failures: outcome
            .cleanup_failures
            .into_iter()
            .map(|f| CleanupFailureBody {
                key: f.key,
                error: f.error,
            })
            .collect(),
    })
}

/// Purge response.
#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub filename: String,
    pub deleted: usize,
}

/// POST /purge - Abandon a session by deleting all of its chunks.
pub async fn purge_upload(
    State(state): State<AppState>,
    form: Result<Form<SessionParams>, FormRejection>,
) -> ApiResult<Json<PurgeResponse>> {
    let Form(params) = form.map_err(rejected)?;
    let session = params.session()?;
    let deleted = state.coordinator.purge(&session).await?;

    Ok(Json(PurgeResponse {
        session_id: session.session_id().to_string(),
        filename: session.filename().to_string(),
        deleted,
    }))
}

/// GET /artifact - Stream a merged artifact.
pub async fn get_artifact(
    State(state): State<AppState>,
    query: Result<Query<SessionParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query.map_err(rejected)?;
    let session = params.session()?;
    let artifact = state.coordinator.open_artifact(&session).await?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(artifact.size)),
        ],
        Body::from_stream(artifact.stream),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_core::ChunkIndex;

    fn params(expected_total: Option<&str>, chunks: Option<&str>) -> MergeParams {
        MergeParams {
            session_id: Some("s".to_string()),
            filename: Some("f".to_string()),
            expected_total: expected_total.map(str::to_string),
            chunks: chunks.map(str::to_string),
        }
    }

    #[test]
    fn test_merge_plan_selection() {
        assert_eq!(params(None, None).plan().unwrap(), MergePlan::AsPresent);
        assert_eq!(params(Some(""), Some(" ")).plan().unwrap(), MergePlan::AsPresent);
        assert_eq!(params(Some("4"), None).plan().unwrap(), MergePlan::Expected(4));
        assert_eq!(
            params(None, Some("2,0")).plan().unwrap(),
            MergePlan::Listed(vec![ChunkIndex::new(2), ChunkIndex::new(0)])
        );
        assert!(params(Some("4"), Some("0,1")).plan().is_err());
        assert!(params(Some("four"), None).plan().is_err());
    }
}
