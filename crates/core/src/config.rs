//! Configuration types shared across crates.

use crate::MAX_KEY_LEN;
use crate::keys::MAX_SCHEME_KEY_LEN;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Maximum request body size in bytes. Bounds a single chunk upload.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        secret_access_key: Option<String>,
        /// Force path-style URLs (e.g., `endpoint/bucket/key` instead of `bucket.endpoint/key`).
        /// Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
        /// Create the bucket at startup when it does not exist yet.
        #[serde(default)]
        create_bucket: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                prefix,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.trim().is_empty() {
                    return Err("s3 config requires a non-empty bucket".to_string());
                }
                let prefix_len = prefix.as_deref().map_or(0, |p| p.trim_matches('/').len());
                if prefix_len + 1 + MAX_SCHEME_KEY_LEN > MAX_KEY_LEN {
                    return Err(format!(
                        "s3 prefix of {prefix_len} bytes leaves no room for keys of up to {MAX_SCHEME_KEY_LEN} bytes"
                    ));
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { path } => {
                if path.as_os_str().is_empty() {
                    return Err("filesystem storage requires a path".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Upload coordination configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upper bound in seconds on any single blob store call
    /// (one write, one read of a chunk segment, one delete).
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    /// Upper bound in seconds on building a merged artifact, from listing
    /// the chunks to committing the result.
    #[serde(default = "default_merge_timeout_secs")]
    pub merge_timeout_secs: u64,
    /// Largest chunk count a session may declare or merge.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: u64,
}

fn default_store_timeout_secs() -> u64 {
    30
}

fn default_merge_timeout_secs() -> u64 {
    3600 // 1 hour
}

fn default_max_chunks() -> u64 {
    100_000
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            store_timeout_secs: default_store_timeout_secs(),
            merge_timeout_secs: default_merge_timeout_secs(),
            max_chunks: default_max_chunks(),
        }
    }
}

impl UploadConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn merge_timeout(&self) -> Duration {
        Duration::from_secs(self.merge_timeout_secs)
    }

    /// Reject timeouts that would fail every request.
    pub fn validate(&self) -> Result<(), String> {
        if self.store_timeout_secs == 0 {
            return Err("upload.store_timeout_secs cannot be 0".to_string());
        }
        if self.merge_timeout_secs == 0 {
            return Err("upload.merge_timeout_secs cannot be 0".to_string());
        }
        if self.max_chunks == 0 {
            return Err("upload.max_chunks cannot be 0".to_string());
        }
        if self.merge_timeout_secs < self.store_timeout_secs {
            return Err(format!(
                "upload.merge_timeout_secs ({}) must be at least upload.store_timeout_secs ({})",
                self.merge_timeout_secs, self.store_timeout_secs
            ));
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upload coordination configuration.
    #[serde(default)]
    pub upload: UploadConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage under `path`.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::Filesystem { path: path.into() },
            upload: UploadConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.upload.validate()?;
        if self.server.max_body_bytes == 0 {
            return Err("server.max_body_bytes cannot be 0".to_string());
        }
        Ok(())
    }
}
