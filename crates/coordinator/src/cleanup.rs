//! Chunk deletion: post-merge cleanup and explicit purge.

use crate::error::{CoordinatorResult, NotFoundExt};
use crate::merge::CleanupFailure;
use crate::Coordinator;
use stitch_core::SessionRef;
use tracing::instrument;

impl Coordinator {
    /// Best-effort delete of `keys`. A key that is already gone counts as
    /// deleted. Failures are logged and returned, never raised.
    pub(crate) async fn delete_chunks<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Vec<CleanupFailure> {
        let mut failures = Vec::new();
        for key in keys {
            if let Err(e) = self
                .bounded("delete", key, self.store.delete(key))
                .await
                .allow_not_found()
            {
                tracing::warn!(key = %key, error = %e, "Failed to delete chunk after merge");
                failures.push(CleanupFailure {
                    key: key.to_string(),
                    error: e.to_string(),
                });
            }
        }
        failures
    }

    /// Delete every chunk stored for `session` and return how many were
    /// removed. The merged artifact, if any, is left alone.
    ///
    /// Keys that do not parse as chunks are deleted too. Every key is
    /// attempted; the first failure is returned after the sweep.
    #[instrument(skip(self, session), fields(session_id = %session.session_id(), filename = %session.filename()))]
    pub async fn purge(&self, session: &SessionRef) -> CoordinatorResult<usize> {
        let mut deleted = 0usize;
        let mut first_error = None;

        for key in self.raw_chunk_keys(session).await? {
            match self
                .bounded("delete", &key, self.store.delete(&key))
                .await
                .allow_not_found()
            {
                Ok(Some(())) => deleted += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to purge chunk");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!(deleted, "Purged session chunks");
                Ok(deleted)
            }
        }
    }
}
