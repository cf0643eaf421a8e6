use thiserror::Error;

use crate::record::{TxnId, TxnStatus};

/// Errors from transaction log operations.
#[derive(Debug, Error)]
pub enum TxnError {
    /// The transaction is not in the log.
    #[error("transaction not found: {0}")]
    NotFound(TxnId),

    /// Completion with an invalid status transition.
    #[error("invalid transition for {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: TxnId,
        from: TxnStatus,
        to: TxnStatus,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the journal file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for transaction operations.
pub type TxnResult<T> = Result<T, TxnError>;
