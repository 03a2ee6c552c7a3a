use thiserror::Error;

#[derive(Debug, Error)]
pub enum DhtError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid identifier length: expected 20 bytes, got {0}")]
    InvalidLength(usize),

    #[error("node id outside of bucket range")]
    OutOfRange,

    #[error("bucket full")]
    BucketFull,

    #[error("bucket at maximum tree depth {0}")]
    DepthLimit(usize),

    #[error("internal error: no child bucket accepted node id")]
    BrokenPartitionInvariant,

    #[error("unknown token")]
    UnknownToken,

    #[error("token issued to a different node")]
    TokenMismatch,

    #[error("token space exhausted: counter wrapped onto a live token")]
    TokenSpaceExhausted,

    #[error("token width must be between 1 and 8 bytes, got {0}")]
    InvalidTokenWidth(usize),
}

impl DhtError {
    /// A broken tree invariant. Never expected at runtime; callers should abort
    /// the operation rather than retry.
    pub fn is_internal(&self) -> bool {
        matches!(self, DhtError::BrokenPartitionInvariant)
    }

    /// An ordinary refusal: the request is well-formed but is turned down.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DhtError::BucketFull
                | DhtError::DepthLimit(_)
                | DhtError::UnknownToken
                | DhtError::TokenMismatch
                | DhtError::TokenSpaceExhausted
        )
    }
}
