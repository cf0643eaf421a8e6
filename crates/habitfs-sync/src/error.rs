use thiserror::Error;

/// Errors from sync/notification operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Serialization failure while hashing or framing an event.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A transport failed to deliver an event to a remote device.
    ///
    /// Delivery is fire-and-forget; callers log this and move on.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Result alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
