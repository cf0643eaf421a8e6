//! High-level facade for the habitfs object store.
//!
//! [`FolderStore`] wires every subsystem — content-addressed objects,
//! versioned references, copy-on-write tree construction, the derived
//! path index, the layered cache, the transaction log, invalidation
//! broadcast, and garbage collection — behind the logical operation
//! surface collaborators call:
//!
//! - [`FolderStore::put_object`] / [`FolderStore::get_object`]
//! - [`FolderStore::resolve_path`] (cache-first)
//! - [`FolderStore::cow_copy`]
//! - [`FolderStore::update_ref`]
//! - [`FolderStore::invalidate`]
//! - [`FolderStore::run_gc`]
//! - [`FolderStore::stats`]
//!
//! The caller (the habit/folder service) owns the content transform and
//! all business semantics; the store guarantees content addressing,
//! sharing, and atomicity around whatever bytes it is given.

pub mod config;
pub mod error;
pub mod stats;
pub mod store;

pub use config::StoreConfig;
pub use error::{SdkError, SdkResult};
pub use stats::StoreStats;
pub use store::{CopyReceipt, FolderStore};

// Re-export key types for embedders.
pub use habitfs_gc::GcReport;
pub use habitfs_refs::Reference;
pub use habitfs_store::{Blob, ObjectKind, Tree, TreeEntry};
pub use habitfs_sync::{EventFilter, SyncEvent};
pub use habitfs_tree::{ContentTransform, CopyMode, FailedItem, TransformError, TransformOutput};
pub use habitfs_txn::{Journal, JournalConfig, TransactionRecord, TxnId, TxnStatus};
pub use habitfs_types::{DeviceId, Digest, Timestamp};
