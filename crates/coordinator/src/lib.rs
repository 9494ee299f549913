//! Chunked upload coordination on top of a blob store.
//!
//! A [`Coordinator`] records chunks as they arrive, reports which ones are
//! still missing, and concatenates a complete session into a single merged
//! artifact. It keeps no state of its own: the chunk keys in the store are
//! the session record, so any number of coordinators may share one store.
//!
//! Every store call is bounded by the configured store timeout; a call that
//! exceeds it fails with a [`CoordinatorError::Store`] whose source is an
//! I/O error of kind `TimedOut`.

mod cleanup;
mod completeness;
pub mod error;
mod merge;
mod registry;
mod staged;

pub use completeness::missing_indices;
pub use error::{CoordinatorError, CoordinatorResult};
pub use merge::{Artifact, CleanupFailure, MergeOutcome, MergePlan};

use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stitch_core::config::UploadConfig;
use stitch_storage::{ObjectStore, StorageError, StorageResult};

/// Entry point for every upload operation.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn ObjectStore>,
    store_timeout: Duration,
    merge_timeout: Duration,
    max_chunks: u64,
}

impl Coordinator {
    pub fn new(store: Arc<dyn ObjectStore>, config: &UploadConfig) -> Self {
        Self {
            store,
            store_timeout: config.store_timeout(),
            merge_timeout: config.merge_timeout(),
            max_chunks: config.max_chunks,
        }
    }

    /// The underlying blob store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Run one store call under the store timeout.
    pub(crate) async fn bounded<T>(
        &self,
        op: &'static str,
        key: &str,
        call: impl Future<Output = StorageResult<T>>,
    ) -> CoordinatorResult<T> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(|e| CoordinatorError::store(op, key, e)),
            Err(_) => Err(timed_out(op, key, self.store_timeout)),
        }
    }

    /// Pull the next item from a store stream under the store timeout.
    pub(crate) async fn bounded_next<T, S>(
        &self,
        op: &'static str,
        key: &str,
        stream: &mut S,
    ) -> CoordinatorResult<Option<T>>
    where
        S: Stream<Item = StorageResult<T>> + Unpin,
    {
        self.bounded(op, key, async { stream.next().await.transpose() })
            .await
    }

    /// Reject chunk counts above the configured ceiling.
    pub(crate) fn check_chunk_count(&self, field: &'static str, count: u64) -> CoordinatorResult<()> {
        if count > self.max_chunks {
            return Err(CoordinatorError::InvalidInput {
                field,
                reason: format!("{count} exceeds the maximum of {} chunks", self.max_chunks),
            });
        }
        Ok(())
    }
}

pub(crate) fn timed_out(op: &'static str, key: &str, limit: Duration) -> CoordinatorError {
    CoordinatorError::store(
        op,
        key,
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("{op} did not complete within {}s", limit.as_secs_f64()),
        )),
    )
}
