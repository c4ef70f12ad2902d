use std::path::PathBuf;

/// Errors from key-value store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store was closed and no longer accepts operations.
    #[error("store is closed")]
    Closed,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A log record could not be decoded.
    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    /// A generation directory name is not a decimal id.
    #[error("invalid generation directory name: {0}")]
    InvalidGenerationName(String),

    /// The generation root exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
