//! Multipart chunk upload.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{missing_field, optional_count, rejected, required};
use crate::metrics::{BYTES_UPLOADED, CHUNK_UPLOAD_DURATION, CHUNKS_UPLOADED, record_upload_error};
use crate::state::AppState;
use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use bytes::Bytes;
use serde::Serialize;
use std::convert::Infallible;
use std::time::Instant;
use stitch_coordinator::CoordinatorError;
use stitch_core::{ChunkIndex, ChunkRef, SessionRef};

/// Chunk upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub filename: String,
    #[serde(rename = "chunkIndex")]
    pub chunk_index: u64,
    pub size: u64,
}

/// Text fields collected from the multipart body so far.
#[derive(Debug, Default)]
struct ChunkFields {
    session_id: Option<String>,
    filename: Option<String>,
    chunk_index: Option<String>,
    total_parts: Option<String>,
    /// Filename carried by the file part itself, used when no `filename`
    /// field was sent.
    part_filename: Option<String>,
}

impl ChunkFields {
    /// Whether the chunk can be streamed straight to the store.
    fn is_ready(&self) -> bool {
        self.session_id.is_some() && self.filename.is_some() && self.chunk_index.is_some()
    }

    fn chunk_ref(&self) -> ApiResult<ChunkRef> {
        let session_id = required("sessionID", self.session_id.clone())?;
        let filename = required(
            "filename",
            self.filename.clone().or_else(|| self.part_filename.clone()),
        )?;
        let session = SessionRef::new(session_id, filename).map_err(CoordinatorError::from)?;
        let index = ChunkIndex::parse(
            "chunkIndex",
            self.chunk_index
                .as_deref()
                .ok_or_else(|| missing_field("chunkIndex"))?,
        )
        .map_err(CoordinatorError::from)?;
        Ok(ChunkRef::new(session, index))
    }
}

/// POST /upload - Store one chunk of a session.
///
/// Fields: `sessionID` (alias `upload_id`), `filename`, `chunkIndex` (alias
/// `part_number`), optional `total_parts`, and the file part `file` (alias
/// `chunk`). When the identifying fields precede the file part the chunk is
/// streamed to the store; otherwise the file part is buffered first.
#[tracing::instrument(skip_all)]
pub async fn upload_chunk(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let start_time = Instant::now();
    let multipart = multipart.map_err(rejected)?;

    let result = receive_chunk(&state, multipart).await;
    match &result {
        Ok(response) => {
            CHUNKS_UPLOADED.inc();
            BYTES_UPLOADED.inc_by(response.size);
            CHUNK_UPLOAD_DURATION.observe(start_time.elapsed().as_secs_f64());
        }
        Err(e) => record_upload_error(e.code()),
    }
    result.map(Json)
}

async fn receive_chunk(state: &AppState, mut multipart: Multipart) -> ApiResult<UploadResponse> {
    let mut fields = ChunkFields::default();
    let mut stored: Option<(ChunkRef, u64)> = None;
    let mut buffered: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "chunk" => {
                if stored.is_some() || buffered.is_some() {
                    return Err(ApiError::BadRequest(
                        "multipart body carries more than one file part".to_string(),
                    ));
                }
                fields.part_filename = field.file_name().map(str::to_string);

                if fields.is_ready() {
                    let chunk = fields.chunk_ref()?;
                    let size = state.coordinator.store_chunk(&chunk, field).await?;
                    stored = Some((chunk, size));
                } else {
                    buffered = Some(field.bytes().await?);
                }
            }
            "sessionID" | "upload_id" => fields.session_id = Some(field.text().await?),
            "filename" => fields.filename = Some(field.text().await?),
            "chunkIndex" | "part_number" => fields.chunk_index = Some(field.text().await?),
            "totalParts" | "total_parts" => fields.total_parts = Some(field.text().await?),
            other => tracing::debug!(field = %other, "Ignoring unknown multipart field"),
        }
    }

    let (chunk, size) = match (stored, buffered) {
        (Some(stored), _) => stored,
        (None, Some(data)) => {
            let chunk = fields.chunk_ref()?;
            let body = futures::stream::once(async move { Ok::<_, Infallible>(data) });
            let size = state.coordinator.store_chunk(&chunk, body).await?;
            (chunk, size)
        }
        (None, None) => return Err(missing_field("file")),
    };

    let index = chunk.index().get();
    let message = match optional_count("total_parts", fields.total_parts.as_deref())? {
        Some(total) => format!("Part {index} of {total} uploaded successfully"),
        None => format!("Part {index} uploaded successfully"),
    };

    Ok(UploadResponse {
        message,
        session_id: chunk.session().session_id().to_string(),
        filename: chunk.session().filename().to_string(),
        chunk_index: index,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_fields_fall_back_to_part_filename() {
        let fields = ChunkFields {
            session_id: Some("s".to_string()),
            chunk_index: Some("3".to_string()),
            part_filename: Some("video.mp4".to_string()),
            ..ChunkFields::default()
        };
        assert!(!fields.is_ready());

        let chunk = fields.chunk_ref().unwrap();
        assert_eq!(chunk.session().filename(), "video.mp4");
        assert_eq!(chunk.index(), ChunkIndex::new(3));
    }

    #[test]
    fn test_chunk_fields_require_index() {
        let fields = ChunkFields {
            session_id: Some("s".to_string()),
            filename: Some("f".to_string()),
            ..ChunkFields::default()
        };
        match fields.chunk_ref() {
            Err(ApiError::Coordinator(CoordinatorError::InvalidInput { field, .. })) => {
                assert_eq!(field, "chunkIndex")
            }
            other => panic!("expected missing chunkIndex, got {other:?}"),
        }
    }
}
