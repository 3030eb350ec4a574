//! Storage error types.

/// Errors that can occur during storage operations.
///
/// Variants map one-to-one onto the engine's semantic error kinds so callers
/// (and the CLI exit-code policy) can classify without string matching.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g., "issue", "dependency").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// An issue with this caller-supplied id already exists.
    #[error("issue already exists: {id}")]
    Duplicate {
        /// The colliding id.
        id: String,
    },

    /// The issue type is not builtin and not configured in `types.custom`.
    #[error("invalid issue type: '{value}'")]
    InvalidType {
        /// The rejected type string.
        value: String,
    },

    /// An update attempted to change an immutable column.
    #[error("field '{field}' is read-only")]
    ReadOnlyField {
        /// The immutable field name.
        field: String,
    },

    /// A referential constraint was violated (cycle, self-loop, dangling ref).
    #[error("constraint violated: {reason}")]
    Constraint {
        /// Description naming the offending edge.
        reason: String,
    },

    /// Contention on the backing store outlasted the bounded retries.
    #[error("storage lock timed out")]
    LockTimeout,

    /// The backing store is unreachable or failing at the I/O level.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// ID generation exhausted its nonce budget without finding a free id.
    #[error("could not allocate a unique id after {attempts} attempts")]
    IdExhausted {
        /// How many nonces were tried.
        attempts: u32,
    },

    /// The workspace was opened read-only and a write was attempted.
    #[error("workspace is read-only")]
    ReadOnly,

    /// A validation constraint on field content was violated.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the failure.
        message: String,
    },

    /// An error transported back from the daemon over RPC. The user/engine
    /// classification of the original error survives the round-trip.
    #[error("{message}")]
    Remote { message: String, user_error: bool },

    /// The daemon socket is present but not answering.
    #[error("daemon unavailable: {0}")]
    DaemonUnavailable(String),

    /// A raw SQLite error that is not one of the mapped kinds.
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the storage crates.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    // -- Constructors --------------------------------------------------------

    /// Creates a [`StorageError::NotFound`] for the given entity kind and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a [`StorageError::Constraint`] with the given reason.
    pub fn constraint(reason: impl Into<String>) -> Self {
        Self::Constraint {
            reason: reason.into(),
        }
    }

    /// Creates a [`StorageError::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    // -- Predicates ----------------------------------------------------------

    /// Returns `true` if this is a [`StorageError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the caller did something fixable (exit code 1) as
    /// opposed to the engine failing (exit code 2).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Duplicate { .. }
                | Self::InvalidType { .. }
                | Self::ReadOnlyField { .. }
                | Self::Constraint { .. }
                | Self::ReadOnly
                | Self::Validation { .. }
                | Self::Remote {
                    user_error: true,
                    ..
                }
        )
    }

    /// Returns `true` if the error is transient contention that may succeed
    /// on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Query(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Human-friendly recovery hint, if one is known.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => Some("check the id with 'bd list'"),
            Self::Duplicate { .. } => Some("omit --id to auto-generate one"),
            Self::InvalidType { .. } => Some("see 'bd types' for the configured set"),
            Self::Constraint { .. } => Some("run 'bd dep remove' to break the offending edge"),
            Self::LockTimeout => Some("another process holds the workspace lock; retry shortly"),
            Self::ReadOnly => Some("drop --readonly to mutate this workspace"),
            _ => None,
        }
    }
}
