//! Cross-device cache coherence for habitfs.
//!
//! The authoritative store lives behind a single writer of record; other
//! devices hold caches. [`SyncNotifier`] gives them best-effort, at-least-
//! once invalidation: a mutation enqueues a [`SyncEvent`], a background
//! dispatcher fans it out to filtered subscribers, and a dropped event
//! only delays convergence — bounded by the path index lease, never by
//! delivery guarantees.
//!
//! Producers and consumers are decoupled through broadcast channels; there
//! is no mutable observer list to manage.

pub mod error;
pub mod event;
pub mod notifier;
pub mod transport;

pub use error::{SyncError, SyncResult};
pub use event::{EventId, EventKind, EventPayload, SyncEvent};
pub use notifier::{EventFilter, EventStream, NotifierConfig, SyncNotifier};
pub use transport::{InvalidationTransport, LoopbackTransport};
