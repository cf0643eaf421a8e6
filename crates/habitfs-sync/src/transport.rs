use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{SyncError, SyncResult};
use crate::event::SyncEvent;
use crate::notifier::SyncNotifier;

/// Delivery boundary for invalidation events to remote devices.
///
/// Implementations push events over whatever channel reaches the other
/// device (push service, websocket, polling bridge). Delivery is
/// at-least-once and fire-and-forget: the caller logs failures and moves
/// on, relying on lease expiry for eventual convergence.
#[async_trait]
pub trait InvalidationTransport: Send + Sync {
    /// Deliver one event to the remote side.
    async fn deliver(&self, event: &SyncEvent) -> SyncResult<()>;
}

/// In-process transport: hands events to another session's notifier.
///
/// Used in tests and single-process multi-session setups, where "remote"
/// readers are other [`SyncNotifier`] instances in the same process.
pub struct LoopbackTransport {
    remote: Arc<SyncNotifier>,
}

impl LoopbackTransport {
    /// Create a transport delivering into the given notifier.
    pub fn new(remote: Arc<SyncNotifier>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl InvalidationTransport for LoopbackTransport {
    async fn deliver(&self, event: &SyncEvent) -> SyncResult<()> {
        if !event.verify_integrity() {
            return Err(SyncError::Delivery(format!(
                "integrity check failed for {}",
                event.id
            )));
        }
        self.remote.enqueue(event.clone());
        Ok(())
    }
}
