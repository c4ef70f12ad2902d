use tsm_crypto::CodecError;
use tsm_store::StoreError;
use tsm_types::NodeHash;

/// Errors from storage manager operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// A required collaborator was not supplied at construction.
    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),

    /// Configuration values that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// The key is absent from every active storage layer.
    #[error("key not found")]
    KeyNotFound,

    /// A node referenced by the trie being walked is absent from every layer.
    #[error("trie node {0} not found")]
    MissingNode(NodeHash),

    /// A stored node does not hash to the key it was stored under.
    #[error("node hash mismatch: stored under {expected}, hashes to {computed}")]
    NodeHashMismatch { expected: NodeHash, computed: NodeHash },

    /// The dispatcher stopped while a request was waiting for a worker slot.
    #[error("timed out waiting to start the operation")]
    TimedOutWaitingToStart,

    /// A tree walk observed the cancellation signal.
    #[error("context closing")]
    ContextClosing,

    /// One or more backends failed to close; carries the last failure.
    #[error("trie storage manager close failed: {0}")]
    CloseFailed(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for storage manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;
