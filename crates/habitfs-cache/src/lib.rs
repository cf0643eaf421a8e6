//! Multi-level read cache for habitfs.
//!
//! [`LayeredCache`] sits in front of the object store and the path index:
//! reads check a bounded in-process LRU (L1), then a larger TTL-expiring
//! map (L2), then fall through to the origin; any origin hit populates
//! both levels on the way back.
//!
//! The cache is purely a performance artifact, never a source of truth:
//! - Writers evict affected entries synchronously and broadcast
//!   invalidation for other readers.
//! - A full L2 degrades to bypassing inserts — capacity pressure is never
//!   an error to the caller.
//! - Each cache is an explicitly owned instance injected where it is
//!   used; there is no process-wide singleton.

pub mod layered;

pub use layered::{CacheConfig, CacheStats, LayeredCache};
