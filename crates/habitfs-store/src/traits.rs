use habitfs_types::Digest;

use crate::error::StoreResult;
use crate::object::{ObjectMeta, StoredObject};

/// Result of a write: the content digest plus whether the write was a
/// dedup short-circuit.
///
/// A deduplicated write stored no new bytes; the caller is still expected
/// to bump the object's reference count, which is why the flag is surfaced
/// rather than hidden.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Content-addressed digest of the written object.
    pub digest: Digest,
    /// `true` if an identical object already existed.
    pub deduplicated: bool,
}

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. Content-addressing guarantees
///   this: the same data always produces the same digest.
/// - Writes are idempotent and keyed by content digest; concurrent writers
///   of identical content never corrupt state.
/// - Reads re-verify the stored digest; a mismatch is fatal corruption.
/// - Deletion is reserved for garbage collection. Deleting a referenced
///   object corrupts the store.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed digest.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    /// Returns `Err(StoreError::Corruption)` if the stored bytes no longer
    /// hash to the digest they are keyed by.
    fn get(&self, digest: &Digest) -> StoreResult<Option<StoredObject>>;

    /// Write an object, deduplicating by content digest.
    ///
    /// If an identical object already exists, nothing is written and the
    /// outcome reports `deduplicated: true`.
    fn put(&self, object: &StoredObject) -> StoreResult<WriteOutcome>;

    /// Check whether an object exists in the store.
    fn exists(&self, digest: &Digest) -> StoreResult<bool>;

    /// Delete an object by digest. Returns `true` if the object existed.
    ///
    /// Garbage collection only: callers must have observed a zero
    /// reference count for the digest.
    fn delete(&self, digest: &Digest) -> StoreResult<bool>;

    /// Volatile access metadata for an object, if tracked.
    fn meta(&self, digest: &Digest) -> StoreResult<Option<ObjectMeta>>;

    /// All object digests in the store, sorted.
    ///
    /// Used by the garbage collector to confirm a candidate's children
    /// are not embedded elsewhere before cascading.
    fn all_digests(&self) -> StoreResult<Vec<Digest>>;

    /// Read multiple objects in a batch.
    ///
    /// Default implementation calls `get()` for each digest. Backends may
    /// override for fewer I/O round-trips.
    fn get_batch(&self, digests: &[Digest]) -> StoreResult<Vec<Option<StoredObject>>> {
        digests.iter().map(|d| self.get(d)).collect()
    }

    /// Write multiple objects in a batch and return their outcomes.
    fn put_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<WriteOutcome>> {
        objects.iter().map(|obj| self.put(obj)).collect()
    }
}
