//! Derived path index for habitfs.
//!
//! [`PathIndex`] maps logical paths (`"folder/1/Run"`) to object digests
//! for near-constant-time resolution, skipping the ref-then-tree walk.
//! It is a cache, never authoritative: every entry is rebuildable from
//! the reference store and the trees, and every entry carries a lease
//! (`expires_at`) that bounds how stale a remote reader can ever be.
//!
//! After a successful commit the index is rebuilt incrementally: only the
//! mutated container and its direct children are recomputed, so the work
//! is proportional to the change, not to the total tree size. Deeper
//! descendants converge through lease expiry.

pub mod entry;
pub mod index;

pub use entry::PathEntry;
pub use index::{IndexConfig, PathIndex};
