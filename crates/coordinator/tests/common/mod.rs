//! Common test utilities for coordinator integration tests.

pub mod faulty;

#[allow(unused_imports)]
pub use faulty::*;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use stitch_coordinator::Coordinator;
use stitch_core::config::UploadConfig;
use stitch_core::{ChunkIndex, ChunkRef, SessionRef};
use stitch_storage::{FilesystemBackend, ObjectStore};
use tempfile::TempDir;

/// A coordinator over a filesystem store wrapped in a [`FaultyStore`].
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestCoordinator {
    pub coordinator: Coordinator,
    pub faults: Arc<Faults>,
    pub inner: Arc<dyn ObjectStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestCoordinator {
    pub async fn new() -> Self {
        Self::with_config(UploadConfig::default()).await
    }

    pub async fn with_config(config: UploadConfig) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let inner: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(temp_dir.path())
                .await
                .expect("Failed to create storage backend"),
        );
        let faults = Arc::new(Faults::default());
        let store: Arc<dyn ObjectStore> = Arc::new(FaultyStore::new(inner.clone(), faults.clone()));

        Self {
            coordinator: Coordinator::new(store, &config),
            faults,
            inner,
            _temp_dir: temp_dir,
        }
    }

    /// Store `data` as chunk `index` of `session`, split into small segments.
    pub async fn upload(&self, session: &SessionRef, index: u64, data: &[u8]) -> u64 {
        let chunk = ChunkRef::new(session.clone(), ChunkIndex::new(index));
        self.coordinator
            .store_chunk(&chunk, segments(data, 7))
            .await
            .expect("store_chunk failed")
    }

    /// Read the merged artifact of `session` into memory.
    pub async fn read_artifact(&self, session: &SessionRef) -> Vec<u8> {
        let artifact = self
            .coordinator
            .open_artifact(session)
            .await
            .expect("artifact should exist");
        let mut stream = artifact.stream;
        let mut out = Vec::with_capacity(artifact.size as usize);
        while let Some(segment) = stream.next().await {
            out.extend_from_slice(&segment.expect("artifact read failed"));
        }
        assert_eq!(out.len() as u64, artifact.size);
        out
    }

    /// Keys under the session's chunk prefix, as the raw store sees them.
    pub async fn chunk_listing(&self, session: &SessionRef) -> Vec<String> {
        let mut keys = self.inner.list(&session.chunk_prefix()).await.unwrap();
        keys.sort();
        keys
    }
}

#[allow(dead_code)]
pub fn session(id: &str, filename: &str) -> SessionRef {
    SessionRef::new(id, filename).unwrap()
}

#[allow(dead_code)]
pub fn indices(values: &[u64]) -> Vec<ChunkIndex> {
    values.iter().copied().map(ChunkIndex::new).collect()
}

/// A body stream yielding `data` in segments of at most `size` bytes.
#[allow(dead_code)]
pub fn segments(
    data: &[u8],
    size: usize,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + use<> {
    let parts: Vec<Result<Bytes, std::io::Error>> = data
        .chunks(size.max(1))
        .map(|part| Ok(Bytes::copy_from_slice(part)))
        .collect();
    futures::stream::iter(parts)
}

/// Deterministic payload for chunk `index`, with a length that varies per index.
#[allow(dead_code)]
pub fn payload(index: u64) -> Vec<u8> {
    let len = 1 + (index as usize * 37) % 101;
    (0..len).map(|i| (index as u8).wrapping_mul(31).wrapping_add(i as u8)).collect()
}
