/// Errors from node marshaling.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("empty node encoding")]
    EmptyEncoding,
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
