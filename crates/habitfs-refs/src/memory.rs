//! In-memory reference store for testing and embedding.
//!
//! [`InMemoryRefStore`] stores all references in a `HashMap` protected by
//! a `RwLock`. The compare-and-swap runs under one write-lock acquisition,
//! which is the in-memory analogue of a durable store's atomic conditional
//! update.

use std::collections::HashMap;
use std::sync::RwLock;

use habitfs_types::{DeviceId, Digest};
use tracing::debug;

use crate::error::{RefError, Result};
use crate::names::validate_ref_name;
use crate::traits::RefStore;
use crate::types::Reference;

/// An in-memory implementation of [`RefStore`].
///
/// All data lives in a `HashMap` behind a `RwLock`. Data is lost when the
/// store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    refs: RwLock<HashMap<String, Reference>>,
}

impl InMemoryRefStore {
    /// Create a new empty ref store.
    pub fn new() -> Self {
        Self {
            refs: RwLock::new(HashMap::new()),
        }
    }
}

impl RefStore for InMemoryRefStore {
    fn create(&self, name: &str, target: Digest, owner: DeviceId) -> Result<Reference> {
        validate_ref_name(name)?;

        let mut refs = self.refs.write().expect("lock poisoned");
        if refs.contains_key(name) {
            return Err(RefError::AlreadyExists {
                name: name.to_string(),
            });
        }
        let reference = Reference::new(name, target, owner);
        refs.insert(name.to_string(), reference.clone());
        debug!(name, target = %target, "ref created");
        Ok(reference)
    }

    fn resolve(&self, name: &str) -> Result<Option<Reference>> {
        let refs = self.refs.read().expect("lock poisoned");
        Ok(refs.get(name).cloned())
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected_version: u64,
        new_target: Digest,
    ) -> Result<u64> {
        let mut refs = self.refs.write().expect("lock poisoned");
        let current = refs.get(name).ok_or_else(|| RefError::NotFound {
            name: name.to_string(),
        })?;

        if current.version != expected_version {
            return Err(RefError::Conflict {
                name: name.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }

        let advanced = current.advanced(new_target);
        let new_version = advanced.version;
        refs.insert(name.to_string(), advanced);
        debug!(name, new_version, target = %new_target, "ref swapped");
        Ok(new_version)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let mut refs = self.refs.write().expect("lock poisoned");
        Ok(refs.remove(name).is_some())
    }

    fn list(&self, prefix: &str) -> Result<Vec<Reference>> {
        let refs = self.refs.read().expect("lock poisoned");
        let mut result: Vec<Reference> = refs
            .values()
            .filter(|r| r.name.starts_with(prefix))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> DeviceId {
        DeviceId::new()
    }

    fn digest(b: &[u8]) -> Digest {
        Digest::from_bytes(b)
    }

    #[test]
    fn create_and_resolve() {
        let store = InMemoryRefStore::new();
        let created = store.create("folder/1", digest(b"t1"), owner()).unwrap();
        assert_eq!(created.version, 1);

        let resolved = store.resolve("folder/1").unwrap().unwrap();
        assert_eq!(resolved.target, digest(b"t1"));
        assert_eq!(resolved.version, 1);
    }

    #[test]
    fn create_duplicate_fails() {
        let store = InMemoryRefStore::new();
        store.create("folder/1", digest(b"t1"), owner()).unwrap();
        let err = store.create("folder/1", digest(b"t2"), owner()).unwrap_err();
        assert!(matches!(err, RefError::AlreadyExists { .. }));
    }

    #[test]
    fn create_validates_name() {
        let store = InMemoryRefStore::new();
        assert!(store.create("bad..name", digest(b"t"), owner()).is_err());
    }

    #[test]
    fn resolve_missing_returns_none() {
        let store = InMemoryRefStore::new();
        assert!(store.resolve("folder/none").unwrap().is_none());
    }

    #[test]
    fn cas_success_bumps_version() {
        let store = InMemoryRefStore::new();
        store.create("folder/1", digest(b"t1"), owner()).unwrap();

        let v2 = store
            .compare_and_swap("folder/1", 1, digest(b"t2"))
            .unwrap();
        assert_eq!(v2, 2);

        let resolved = store.resolve("folder/1").unwrap().unwrap();
        assert_eq!(resolved.target, digest(b"t2"));
        assert_eq!(resolved.version, 2);
    }

    #[test]
    fn cas_stale_version_conflicts() {
        let store = InMemoryRefStore::new();
        store.create("folder/1", digest(b"t1"), owner()).unwrap();
        store
            .compare_and_swap("folder/1", 1, digest(b"t2"))
            .unwrap();

        let err = store
            .compare_and_swap("folder/1", 1, digest(b"t3"))
            .unwrap_err();
        assert!(matches!(
            err,
            RefError::Conflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        // Target unchanged by the failed swap.
        let resolved = store.resolve("folder/1").unwrap().unwrap();
        assert_eq!(resolved.target, digest(b"t2"));
    }

    #[test]
    fn cas_missing_ref_is_not_found() {
        let store = InMemoryRefStore::new();
        let err = store
            .compare_and_swap("folder/none", 1, digest(b"t"))
            .unwrap_err();
        assert!(matches!(err, RefError::NotFound { .. }));
    }

    #[test]
    fn delete_ref() {
        let store = InMemoryRefStore::new();
        store.create("folder/1", digest(b"t"), owner()).unwrap();
        assert!(store.delete("folder/1").unwrap());
        assert!(store.resolve("folder/1").unwrap().is_none());
        assert!(!store.delete("folder/1").unwrap());
    }

    #[test]
    fn list_with_prefix_sorted() {
        let store = InMemoryRefStore::new();
        store.create("folder/2", digest(b"b"), owner()).unwrap();
        store.create("folder/1", digest(b"a"), owner()).unwrap();
        store.create("archive/1", digest(b"c"), owner()).unwrap();

        let folders = store.list("folder/").unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].name, "folder/1");
        assert_eq!(folders[1].name, "folder/2");

        let all = store.list("").unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(store.len().unwrap(), 3);
    }

    // Exactly one of two concurrent swaps carrying the same expected
    // version may win.
    #[test]
    fn concurrent_cas_exactly_one_wins() {
        use std::sync::Arc;
        use std::thread;

        for _ in 0..20 {
            let store = Arc::new(InMemoryRefStore::new());
            store.create("folder/1", digest(b"base"), owner()).unwrap();

            let s1 = Arc::clone(&store);
            let s2 = Arc::clone(&store);
            let h1 =
                thread::spawn(move || s1.compare_and_swap("folder/1", 1, digest(b"left")));
            let h2 =
                thread::spawn(move || s2.compare_and_swap("folder/1", 1, digest(b"right")));

            let r1 = h1.join().unwrap();
            let r2 = h2.join().unwrap();
            assert_eq!(
                r1.is_ok() as u8 + r2.is_ok() as u8,
                1,
                "exactly one swap must win"
            );

            let final_ref = store.resolve("folder/1").unwrap().unwrap();
            assert_eq!(final_ref.version, 2);
        }
    }
}
