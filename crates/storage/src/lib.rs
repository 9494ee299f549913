//! Blob store abstraction and backends for stitch.
//!
//! This crate provides:
//! - The [`ObjectStore`] trait the upload coordinator is written against
//! - Staged streaming uploads that only become visible once finished
//! - Backends: local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, KeyStream, ObjectMeta, ObjectStore, StreamingUpload};

use stitch_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
///
/// For S3 with `create_bucket` set, the bucket is provisioned before the
/// store is returned.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
            create_bucket,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            if *create_bucket {
                backend.ensure_bucket().await?;
            }
            Ok(Arc::new(backend))
        }
    }
}
