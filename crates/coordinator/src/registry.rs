//! Chunk registry: durable recording of arriving chunks.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::staged::StagedUpload;
use crate::Coordinator;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use stitch_core::ChunkRef;
use tracing::instrument;

impl Coordinator {
    /// Stream one chunk into the store under its session-scoped key.
    ///
    /// The chunk becomes visible only after the last body segment has been
    /// written and the staged upload committed. Re-storing an index replaces
    /// the previous payload. A body error aborts the staged upload and is
    /// reported as [`CoordinatorError::Body`]; nothing is retried.
    #[instrument(
        skip(self, chunk, body),
        fields(
            session_id = %chunk.session().session_id(),
            filename = %chunk.session().filename(),
            index = %chunk.index(),
        )
    )]
    pub async fn store_chunk<S, E>(&self, chunk: &ChunkRef, body: S) -> CoordinatorResult<u64>
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
        E: Display + Send,
    {
        let key = chunk.key();
        let upload = self
            .bounded("put_stream", &key, self.store.put_stream(&key))
            .await?;
        let mut staged = StagedUpload::new(upload, key, self.store_timeout);

        let mut body = std::pin::pin!(body);
        while let Some(segment) = body.next().await {
            let segment = segment.map_err(|e| CoordinatorError::Body(e.to_string()))?;
            if !segment.is_empty() {
                staged.write(segment).await?;
            }
        }

        let written = staged.finish().await?;
        tracing::debug!(bytes = written, "Stored chunk");
        Ok(written)
    }
}
