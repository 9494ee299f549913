//! Fault-injecting object store wrapper.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use stitch_storage::{
    ByteStream, KeyStream, ObjectMeta, ObjectStore, StorageError, StorageResult, StreamingUpload,
};

/// Switches shared between a test and its [`FaultyStore`].
#[derive(Default)]
#[allow(dead_code)]
pub struct Faults {
    pub fail_delete: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_writes: AtomicBool,
    /// Delay applied before list, get and delete calls.
    pub stall_ms: AtomicU64,
    /// Delay applied before every staged write.
    pub write_stall_ms: AtomicU64,
    pub aborts: AtomicUsize,
}

#[allow(dead_code)]
impl Faults {
    pub fn set(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    async fn stall(delay: &AtomicU64) {
        let ms = delay.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

fn injected(what: &str) -> StorageError {
    StorageError::Io(std::io::Error::other(format!("injected {what} failure")))
}

pub struct FaultyStore {
    inner: Arc<dyn ObjectStore>,
    faults: Arc<Faults>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn ObjectStore>, faults: Arc<Faults>) -> Self {
        Self { inner, faults }
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        Faults::stall(&self.faults.stall_ms).await;
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        Faults::stall(&self.faults.stall_ms).await;
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(injected("put"));
        }
        self.inner.put(key, data).await
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let inner = self.inner.put_stream(key).await?;
        Ok(Box::new(FaultyUpload {
            inner,
            faults: self.faults.clone(),
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Faults::stall(&self.faults.stall_ms).await;
        if self.faults.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Faults::stall(&self.faults.stall_ms).await;
        if self.faults.fail_list.load(Ordering::SeqCst) {
            return Err(injected("list"));
        }
        self.inner.list(prefix).await
    }

    async fn list_stream(&self, prefix: &str) -> StorageResult<KeyStream> {
        Faults::stall(&self.faults.stall_ms).await;
        if self.faults.fail_list.load(Ordering::SeqCst) {
            return Err(injected("list"));
        }
        self.inner.list_stream(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

struct FaultyUpload {
    inner: Box<dyn StreamingUpload>,
    faults: Arc<Faults>,
}

#[async_trait]
impl StreamingUpload for FaultyUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        Faults::stall(&self.faults.write_stall_ms).await;
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(injected("write"));
        }
        self.inner.write(data).await
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        self.inner.finish().await
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.faults.aborts.fetch_add(1, Ordering::SeqCst);
        self.inner.abort().await
    }
}
