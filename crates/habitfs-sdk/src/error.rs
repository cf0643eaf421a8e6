use habitfs_refs::RefError;
use habitfs_store::{RefCountError, StoreError};
use habitfs_tree::CopyError;
use habitfs_txn::TxnError;
use habitfs_types::Digest;
use thiserror::Error;

/// Errors surfaced by the facade.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    ObjectNotFound(Digest),

    /// The requested path does not resolve.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// The named reference does not exist.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// A reference update lost its compare-and-swap.
    #[error("version conflict on {name}: expected {expected}, found {actual}")]
    Conflict {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// Object store failure (including fatal corruption).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reference store failure other than conflict/not-found.
    #[error(transparent)]
    Ref(RefError),

    /// Copy-on-write failure (including exhausted retries).
    #[error(transparent)]
    Copy(#[from] CopyError),

    /// Transaction log failure.
    #[error(transparent)]
    Txn(#[from] TxnError),

    /// Reference counting invariant violation.
    #[error(transparent)]
    RefCount(#[from] RefCountError),
}

impl From<RefError> for SdkError {
    fn from(err: RefError) -> Self {
        match err {
            RefError::Conflict {
                name,
                expected,
                actual,
            } => Self::Conflict {
                name,
                expected,
                actual,
            },
            RefError::NotFound { name } => Self::RefNotFound(name),
            other => Self::Ref(other),
        }
    }
}

/// Result alias for facade operations.
pub type SdkResult<T> = Result<T, SdkError>;
