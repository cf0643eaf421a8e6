use habitfs_refs::RefError;
use habitfs_store::{RefCountError, StoreError};
use thiserror::Error;

/// Errors from copy-on-write tree construction.
#[derive(Debug, Error)]
pub enum CopyError {
    /// The target reference kept moving: every swap attempt lost.
    #[error("ref update conflict on {name} after {attempts} attempts")]
    Conflict { name: String, attempts: u32 },

    /// Object store failure (missing tree, corruption, I/O).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reference store failure other than a retryable conflict.
    #[error(transparent)]
    Ref(#[from] RefError),

    /// Reference counting invariant violation.
    #[error(transparent)]
    RefCount(#[from] RefCountError),
}

/// Result alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;
