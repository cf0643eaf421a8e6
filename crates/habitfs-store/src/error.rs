use habitfs_types::Digest;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(Digest),

    /// Content hash mismatch on read (data corruption). Fatal: surfaced to
    /// the operator, never auto-repaired.
    #[error("corruption: object {digest} re-hashed to {computed}")]
    Corruption { digest: Digest, computed: Digest },

    /// The object data is malformed or cannot be decoded as the expected kind.
    #[error("corrupt object {digest}: {reason}")]
    CorruptObject { digest: Digest, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Attempted to write an object whose digest is null.
    #[error("cannot store object with null digest")]
    NullDigest,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
