//! The [`RefStore`] trait defining the reference storage interface.
//!
//! Any backend (in-memory, filesystem, database) implements this trait to
//! provide versioned named references. The compare-and-swap operation is
//! the single serialization point per container: all other operations are
//! lock-free from the caller's perspective.

use habitfs_types::{DeviceId, Digest};

use crate::error::Result;
use crate::types::Reference;

/// Storage backend for versioned named references.
///
/// Implementations must be thread-safe (`Send + Sync`). The
/// `compare_and_swap` operation must be atomic: of two concurrent calls
/// carrying the same expected version, exactly one succeeds.
pub trait RefStore: Send + Sync {
    /// Create a new reference. Fails with `AlreadyExists` if the name is
    /// taken. The new reference starts at version 1.
    fn create(&self, name: &str, target: Digest, owner: DeviceId) -> Result<Reference>;

    /// Resolve a reference by name.
    ///
    /// Returns `Ok(None)` if the reference does not exist.
    fn resolve(&self, name: &str) -> Result<Option<Reference>>;

    /// Atomically repoint a reference if its version still matches.
    ///
    /// Returns the new version on success; `Conflict` if the reference
    /// moved since it was read; `NotFound` if it does not exist.
    fn compare_and_swap(
        &self,
        name: &str,
        expected_version: u64,
        new_target: Digest,
    ) -> Result<u64>;

    /// Delete a reference by name.
    ///
    /// Returns `Ok(true)` if the reference existed and was deleted.
    /// Only called when the owning container is deleted.
    fn delete(&self, name: &str) -> Result<bool>;

    /// List all references whose name starts with `prefix`, sorted by name.
    ///
    /// Pass `""` to list everything.
    fn list(&self, prefix: &str) -> Result<Vec<Reference>>;

    /// Number of references currently stored.
    fn len(&self) -> Result<usize> {
        Ok(self.list("")?.len())
    }
}
