//! Abort-on-drop wrapper around a staged store upload.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::timed_out;
use bytes::Bytes;
use std::time::Duration;
use stitch_storage::{StorageError, StreamingUpload};

/// Owns a [`StreamingUpload`] until it is finished.
///
/// If the guard is dropped first (an error return, a failed body read, or
/// the surrounding future being cancelled) the upload is aborted on a
/// spawned task, so nothing partial ever becomes visible at the key.
pub(crate) struct StagedUpload {
    upload: Option<Box<dyn StreamingUpload>>,
    key: String,
    limit: Duration,
    runtime_handle: Option<tokio::runtime::Handle>,
}

impl StagedUpload {
    /// `limit` bounds each individual write and the final commit.
    pub(crate) fn new(upload: Box<dyn StreamingUpload>, key: String, limit: Duration) -> Self {
        Self {
            upload: Some(upload),
            key,
            limit,
            runtime_handle: tokio::runtime::Handle::try_current().ok(),
        }
    }

    fn already_finished(&self) -> CoordinatorError {
        CoordinatorError::store(
            "write",
            &self.key,
            StorageError::Io(std::io::Error::other("staged upload already finished")),
        )
    }

    pub(crate) async fn write(&mut self, data: Bytes) -> CoordinatorResult<()> {
        let limit = self.limit;
        let Some(upload) = self.upload.as_mut() else {
            return Err(self.already_finished());
        };

        match tokio::time::timeout(limit, upload.write(data)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CoordinatorError::store("write", &self.key, e)),
            Err(_) => Err(timed_out("write", &self.key, limit)),
        }
    }

    /// Commit the upload and return the number of bytes written.
    pub(crate) async fn finish(mut self) -> CoordinatorResult<u64> {
        let Some(upload) = self.upload.take() else {
            return Err(self.already_finished());
        };

        match tokio::time::timeout(self.limit, upload.finish()).await {
            Ok(Ok(written)) => Ok(written),
            Ok(Err(e)) => Err(CoordinatorError::store("finish", &self.key, e)),
            Err(_) => {
                tracing::warn!(key = %self.key, "Staged upload commit timed out, staging may be orphaned");
                Err(timed_out("finish", &self.key, self.limit))
            }
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        let Some(upload) = self.upload.take() else {
            return;
        };
        let key = std::mem::take(&mut self.key);

        match &self.runtime_handle {
            Some(handle) => {
                handle.spawn(async move {
                    match upload.abort().await {
                        Ok(()) => tracing::debug!(key = %key, "Aborted staged upload"),
                        Err(e) => {
                            tracing::error!(key = %key, error = %e, "Failed to abort staged upload")
                        }
                    }
                });
            }
            None => {
                tracing::warn!(
                    key = %key,
                    "Staged upload dropped without runtime handle, staging may be orphaned"
                );
            }
        }
    }
}
