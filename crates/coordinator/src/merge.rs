//! Merge engine: ordered concatenation of a session's chunks.

use crate::completeness::missing_indices;
use crate::error::{CoordinatorError, CoordinatorResult, NotFoundExt};
use crate::staged::StagedUpload;
use crate::{Coordinator, timed_out};
use std::collections::{BTreeMap, BTreeSet};
use stitch_core::{ChunkIndex, SessionRef};
use stitch_storage::ByteStream;
use tracing::instrument;

/// Which chunks a merge must consist of.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergePlan {
    /// Exactly the indices `0..total`, no more and no fewer.
    Expected(u64),
    /// Exactly these indices, merged in ascending order.
    Listed(Vec<ChunkIndex>),
    /// Whatever is present when the merge starts.
    AsPresent,
}

impl MergePlan {
    /// Validate the plan against the indices present and return the indices
    /// to concatenate, ascending.
    ///
    /// A session with no chunks is [`CoordinatorError::EmptySession`] only
    /// for [`MergePlan::AsPresent`]; the other plans name what is missing.
    pub fn select(&self, present: &BTreeSet<ChunkIndex>) -> CoordinatorResult<Vec<ChunkIndex>> {
        match self {
            MergePlan::Expected(0) => Err(CoordinatorError::InvalidInput {
                field: "expectedTotal",
                reason: "must be at least 1".to_string(),
            }),
            MergePlan::Expected(total) => {
                let missing = missing_indices(present, *total);
                if !missing.is_empty() {
                    return Err(CoordinatorError::Incomplete { missing });
                }
                let extra: Vec<ChunkIndex> =
                    present.range(ChunkIndex::new(*total)..).copied().collect();
                if !extra.is_empty() {
                    return Err(CoordinatorError::UnexpectedChunks { extra });
                }
                Ok(present.iter().copied().collect())
            }
            MergePlan::Listed(listed) => {
                if listed.is_empty() {
                    return Err(CoordinatorError::InvalidInput {
                        field: "chunks",
                        reason: "must name at least one chunk".to_string(),
                    });
                }
                let mut sorted = listed.clone();
                sorted.sort_unstable();
                if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
                    return Err(CoordinatorError::InvalidInput {
                        field: "chunks",
                        reason: format!("chunk {} is listed more than once", pair[0]),
                    });
                }
                let missing: Vec<ChunkIndex> = sorted
                    .iter()
                    .filter(|index| !present.contains(index))
                    .copied()
                    .collect();
                if !missing.is_empty() {
                    return Err(CoordinatorError::Incomplete { missing });
                }
                Ok(sorted)
            }
            MergePlan::AsPresent if present.is_empty() => Err(CoordinatorError::EmptySession),
            MergePlan::AsPresent => Ok(present.iter().copied().collect()),
        }
    }
}

/// A chunk the post-merge cleanup could not delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupFailure {
    pub key: String,
    pub error: String,
}

/// Result of a committed merge.
#[derive(Clone, Debug)]
pub struct MergeOutcome {
    /// Key of the merged artifact.
    pub key: String,
    /// Artifact size in bytes.
    pub bytes: u64,
    /// Number of chunks concatenated.
    pub chunks: usize,
    /// Chunks left behind by cleanup. The merge itself still succeeded.
    pub cleanup_failures: Vec<CleanupFailure>,
}

/// A readable merged artifact.
pub struct Artifact {
    pub key: String,
    pub size: u64,
    pub stream: ByteStream,
}

impl Coordinator {
    /// Concatenate the chunks selected by `plan` into the session's merged
    /// artifact, then delete the session's chunks.
    ///
    /// The artifact is written through a staged upload and committed only
    /// after the last chunk has been copied. Any failure before the commit,
    /// including the merge future being dropped, aborts the staged upload
    /// and leaves the chunks in place. Cleanup runs only after the commit
    /// and its failures are reported in [`MergeOutcome::cleanup_failures`].
    #[instrument(skip(self, session, plan), fields(session_id = %session.session_id(), filename = %session.filename()))]
    pub async fn merge(&self, session: &SessionRef, plan: &MergePlan) -> CoordinatorResult<MergeOutcome> {
        match plan {
            MergePlan::Expected(total) => self.check_chunk_count("expectedTotal", *total)?,
            MergePlan::Listed(listed) => {
                let count = u64::try_from(listed.len()).unwrap_or(u64::MAX);
                self.check_chunk_count("chunks", count)?
            }
            MergePlan::AsPresent => {}
        }

        let key = session.merged_key();
        let build = self.build_artifact(session, plan, &key);
        let (chunk_keys, chunks, bytes) = match tokio::time::timeout(self.merge_timeout, build).await {
            Ok(result) => result?,
            Err(_) => return Err(timed_out("merge", &key, self.merge_timeout)),
        };
        tracing::info!(key = %key, bytes, chunks, "Merged artifact committed");

        let cleanup_failures = self
            .delete_chunks(chunk_keys.values().map(String::as_str))
            .await;

        Ok(MergeOutcome {
            key,
            bytes,
            chunks,
            cleanup_failures,
        })
    }

    async fn build_artifact(
        &self,
        session: &SessionRef,
        plan: &MergePlan,
        key: &str,
    ) -> CoordinatorResult<(BTreeMap<ChunkIndex, String>, usize, u64)> {
        let chunk_keys = self.chunk_keys(session).await?;
        let present: BTreeSet<ChunkIndex> = chunk_keys.keys().copied().collect();
        let selected = plan.select(&present)?;

        let upload = self
            .bounded("put_stream", key, self.store.put_stream(key))
            .await?;
        let mut staged = StagedUpload::new(upload, key.to_string(), self.store_timeout);

        for index in &selected {
            let copied = self.append_chunk(&session.chunk_key(*index), &mut staged).await?;
            tracing::debug!(index = %index, bytes = copied, "Appended chunk");
        }

        let bytes = staged.finish().await?;
        Ok((chunk_keys, selected.len(), bytes))
    }

    /// Copy one chunk into the staged artifact. The chunk's read stream is
    /// dropped before this returns.
    async fn append_chunk(&self, chunk_key: &str, staged: &mut StagedUpload) -> CoordinatorResult<u64> {
        let mut stream = self
            .bounded("get", chunk_key, self.store.get_stream(chunk_key))
            .await?;

        let mut copied = 0u64;
        while let Some(segment) = self.bounded_next("read", chunk_key, &mut stream).await? {
            copied += segment.len() as u64;
            staged.write(segment).await?;
        }
        Ok(copied)
    }

    /// Open the merged artifact of `session` for reading.
    #[instrument(skip(self, session), fields(session_id = %session.session_id(), filename = %session.filename()))]
    pub async fn open_artifact(&self, session: &SessionRef) -> CoordinatorResult<Artifact> {
        let key = session.merged_key();
        let not_found = || CoordinatorError::NotFound(format!("no merged artifact for {session}"));

        let meta = self
            .bounded("head", &key, self.store.head(&key))
            .await
            .allow_not_found()?
            .ok_or_else(not_found)?;
        let stream = self
            .bounded("get", &key, self.store.get_stream(&key))
            .await
            .allow_not_found()?
            .ok_or_else(not_found)?;

        Ok(Artifact {
            key,
            size: meta.size,
            stream,
        })
    }
}
