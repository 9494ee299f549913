use bytes::Bytes;
use stitch_storage::FilesystemBackend;
use std::sync::Arc;
use tempfile::TempDir;

/// Fresh filesystem backend rooted in its own temp dir. Keep the `TempDir`
/// alive for the duration of the test.
pub async fn filesystem_backend() -> (TempDir, Arc<FilesystemBackend>) {
    let dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(dir.path()).await.unwrap();
    (dir, Arc::new(backend))
}

/// Generate deterministic test data using a seeded pseudo-random generator.
/// Same seed produces same output (reproducible tests).
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}
