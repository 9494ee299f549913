//! Completeness check: which chunks of a session are present or missing.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::Coordinator;
use std::collections::{BTreeMap, BTreeSet};
use stitch_core::{ChunkIndex, SessionRef};
use tracing::instrument;

impl Coordinator {
    /// Indices currently stored for `session`, ascending.
    ///
    /// A point-in-time snapshot. Listing failures are returned, never read
    /// as an empty session.
    #[instrument(skip(self, session), fields(session_id = %session.session_id(), filename = %session.filename()))]
    pub async fn list_uploaded(&self, session: &SessionRef) -> CoordinatorResult<BTreeSet<ChunkIndex>> {
        Ok(self.chunk_keys(session).await?.into_keys().collect())
    }

    /// Indices in `0..expected_total` not yet stored, ascending.
    #[instrument(skip(self, session), fields(session_id = %session.session_id(), filename = %session.filename()))]
    pub async fn missing(
        &self,
        session: &SessionRef,
        expected_total: u64,
    ) -> CoordinatorResult<Vec<ChunkIndex>> {
        self.check_chunk_count("expectedTotal", expected_total)?;
        let uploaded = self.list_uploaded(session).await?;
        Ok(missing_indices(&uploaded, expected_total))
    }

    /// Every key under the session prefix, drained from the store's key stream.
    pub(crate) async fn raw_chunk_keys(&self, session: &SessionRef) -> CoordinatorResult<Vec<String>> {
        let prefix = session.chunk_prefix();
        let mut stream = self
            .bounded("list", &prefix, self.store.list_stream(&prefix))
            .await?;

        let mut keys = Vec::new();
        while let Some(key) = self.bounded_next("list", &prefix, &mut stream).await? {
            keys.push(key);
        }
        Ok(keys)
    }

    /// Chunk keys of `session` by index. Any key that does not parse as a
    /// chunk of this session is corruption.
    pub(crate) async fn chunk_keys(
        &self,
        session: &SessionRef,
    ) -> CoordinatorResult<BTreeMap<ChunkIndex, String>> {
        let mut chunks = BTreeMap::new();
        for key in self.raw_chunk_keys(session).await? {
            let index = session.parse_chunk_key(&key)?;
            if chunks.contains_key(&index) {
                return Err(CoordinatorError::Corruption {
                    key,
                    reason: format!("duplicate chunk index {index}"),
                });
            }
            chunks.insert(index, key);
        }
        Ok(chunks)
    }
}

/// The ascending complement of `present` within `0..expected_total`.
pub fn missing_indices(present: &BTreeSet<ChunkIndex>, expected_total: u64) -> Vec<ChunkIndex> {
    (0..expected_total)
        .map(ChunkIndex::new)
        .filter(|index| !present.contains(index))
        .collect()
}
