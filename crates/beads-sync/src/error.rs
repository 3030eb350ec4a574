//! Error types for the sync layer.

use std::path::PathBuf;

/// Errors from projection, manifest, flush and merge operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The backing store failed.
    #[error(transparent)]
    Storage(#[from] beads_storage::StorageError),

    /// The workspace lock could not be taken.
    #[error(transparent)]
    Lock(#[from] beads_lockfile::LockError),

    /// Filesystem failure while reading or publishing a file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSONL or manifest file failed to parse entirely (no valid lines).
    #[error("corrupt file {path}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    /// The merge driver could not resolve every conflict.
    #[error("{count} merge conflict(s) remain unresolved")]
    ConflictUnresolved { count: usize },

    /// JSON encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Wraps an I/O error with its path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
