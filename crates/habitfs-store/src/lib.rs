//! Content-addressed object storage for habitfs.
//!
//! This crate implements a hash-keyed object store: every folder payload
//! and every folder listing is stored as an immutable object identified by
//! its BLAKE3 digest (domain-separated by object kind).
//!
//! # Object Types
//!
//! - [`Blob`] — raw content (a habit's serialized payload)
//! - [`Tree`] — a container listing mapping entry names to digests
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Writes are idempotent: identical content is stored exactly once, and
//!    the write reports whether it was deduplicated so the caller can still
//!    bump the reference count.
//! 3. Reads re-verify the digest; a mismatch is fatal corruption, surfaced
//!    and never silently repaired.
//! 4. Deletion is reserved for the garbage collector, gated by the
//!    [`RefCounter`]: only objects whose count reached zero may go.
//! 5. Access metadata (timestamps, counters) is volatile, kept outside the
//!    hashed payload, and updated best-effort.

pub mod error;
pub mod memory;
pub mod object;
pub mod refcount;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::{Blob, ObjectKind, ObjectMeta, StoredObject, Tree, TreeEntry};
pub use refcount::{RefCount, RefCountError, RefCounter};
pub use traits::{ObjectStore, WriteOutcome};
