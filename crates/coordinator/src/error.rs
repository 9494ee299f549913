//! Coordinator error types.

use stitch_core::ChunkIndex;
use stitch_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by [`crate::Coordinator`] operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Caller input failed validation. `field` is the wire name of the input.
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// The client's body stream failed mid-upload.
    #[error("failed to read upload body: {0}")]
    Body(String),

    #[error("upload incomplete, missing chunks: {}", join_indices(.missing))]
    Incomplete { missing: Vec<ChunkIndex> },

    #[error("chunks beyond the expected total are present: {}", join_indices(.extra))]
    UnexpectedChunks { extra: Vec<ChunkIndex> },

    #[error("no chunks have been uploaded for this session")]
    EmptySession,

    /// A key under a session prefix does not follow the key scheme.
    #[error("corrupt chunk key {key}: {reason}")]
    Corruption { key: String, reason: String },

    /// A blob store call failed or exceeded its deadline.
    #[error("store {op} failed for {key}: {source}")]
    Store {
        op: &'static str,
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("not found: {0}")]
    NotFound(String),
}

impl CoordinatorError {
    pub(crate) fn store(op: &'static str, key: &str, source: StorageError) -> Self {
        Self::Store {
            op,
            key: key.to_string(),
            source,
        }
    }

    /// Short stable label, used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::Body(_) => "body",
            Self::Incomplete { .. } => "incomplete",
            Self::UnexpectedChunks { .. } => "unexpected_chunks",
            Self::EmptySession => "empty_session",
            Self::Corruption { .. } => "corruption",
            Self::Store { .. } => "store",
            Self::NotFound(_) => "not_found",
        }
    }

    /// Whether this error came from a deadline on a store call.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Store { source, .. } if source.is_timeout())
    }

    fn is_store_not_found(&self) -> bool {
        matches!(
            self,
            Self::Store {
                source: StorageError::NotFound(_),
                ..
            }
        )
    }
}

pub(crate) trait NotFoundExt<T> {
    /// Treat a store `NotFound` as `Ok(None)`.
    fn allow_not_found(self) -> CoordinatorResult<Option<T>>;
}

impl<T> NotFoundExt<T> for CoordinatorResult<T> {
    fn allow_not_found(self) -> CoordinatorResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_store_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl From<stitch_core::Error> for CoordinatorError {
    fn from(err: stitch_core::Error) -> Self {
        match err {
            stitch_core::Error::InvalidField { field, reason } => {
                Self::InvalidInput { field, reason }
            }
            stitch_core::Error::MalformedKey { key, reason } => Self::Corruption { key, reason },
        }
    }
}

fn join_indices(indices: &[ChunkIndex]) -> String {
    indices
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;
