//! Copy-on-write tree construction for habitfs.
//!
//! [`TreeBuilder`] implements the core mutation path of the store: given a
//! set of source digests, a target reference, and a caller-owned content
//! transform, it produces a new tree that shares every unchanged subtree
//! with the current one. No existing tree object is ever mutated — the
//! only thing that moves is the target reference, via compare-and-swap.
//!
//! # Guarantees
//!
//! - A new tree's reference count is incremented before the swap that
//!   publishes it, so the collector can never observe a reachable tree at
//!   zero.
//! - Per-item transform failures are reported, not thrown; items that
//!   committed stay committed when the overall swap succeeds.
//! - Losing the swap re-reads the current tree, re-merges, and retries a
//!   bounded number of times with backoff before surfacing `Conflict`.

pub mod builder;
pub mod copy;
pub mod error;
pub mod transform;

pub use builder::TreeBuilder;
pub use copy::{CopyConfig, CopyMode, CopyOutcome, FailedItem};
pub use error::{CopyError, Result};
pub use transform::{ContentTransform, TransformError, TransformOutput};
