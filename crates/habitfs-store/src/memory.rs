use std::collections::HashMap;
use std::sync::RwLock;

use habitfs_types::{Digest, Timestamp};
use tracing::error;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectMeta, StoredObject};
use crate::traits::{ObjectStore, WriteOutcome};

/// In-memory, HashMap-based object store.
///
/// Objects are held behind an `RwLock` for safe concurrent access and
/// cloned on read/write. Access metadata is kept in a separate map so the
/// hashed payload stays free of volatile fields; metadata updates happen
/// after the read completes and are best-effort.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<Digest, StoredObject>>,
    meta: RwLock<HashMap<Digest, ObjectMeta>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            meta: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|obj| obj.size)
            .sum()
    }

    /// Remove all objects from the store.
    pub fn clear(&self) {
        self.objects.write().expect("lock poisoned").clear();
        self.meta.write().expect("lock poisoned").clear();
    }

    /// Best-effort access-metadata bump, outside the read path.
    fn touch(&self, digest: &Digest) {
        if let Ok(mut meta) = self.meta.write() {
            if let Some(m) = meta.get_mut(digest) {
                m.touch(Timestamp::now());
            }
        }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get(&self, digest: &Digest) -> StoreResult<Option<StoredObject>> {
        let found = {
            let map = self.objects.read().expect("lock poisoned");
            map.get(digest).cloned()
        };
        let Some(object) = found else {
            return Ok(None);
        };

        // Re-verify: stored bytes must still hash to the key.
        let computed = object.compute_digest();
        if computed != *digest {
            error!(digest = %digest, computed = %computed, "object store corruption");
            return Err(StoreError::Corruption {
                digest: *digest,
                computed,
            });
        }

        self.touch(digest);
        Ok(Some(object))
    }

    fn put(&self, object: &StoredObject) -> StoreResult<WriteOutcome> {
        let digest = object.compute_digest();
        if digest.is_null() {
            return Err(StoreError::NullDigest);
        }
        let mut map = self.objects.write().expect("lock poisoned");
        if map.contains_key(&digest) {
            // Dedup short-circuit: identical content is already stored.
            return Ok(WriteOutcome {
                digest,
                deduplicated: true,
            });
        }
        map.insert(digest, object.clone());
        drop(map);

        self.meta
            .write()
            .expect("lock poisoned")
            .insert(digest, ObjectMeta::new(Timestamp::now()));
        Ok(WriteOutcome {
            digest,
            deduplicated: false,
        })
    }

    fn exists(&self, digest: &Digest) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(digest))
    }

    fn delete(&self, digest: &Digest) -> StoreResult<bool> {
        let removed = self
            .objects
            .write()
            .expect("lock poisoned")
            .remove(digest)
            .is_some();
        if removed {
            self.meta.write().expect("lock poisoned").remove(digest);
        }
        Ok(removed)
    }

    fn meta(&self, digest: &Digest) -> StoreResult<Option<ObjectMeta>> {
        let map = self.meta.read().expect("lock poisoned");
        Ok(map.get(digest).copied())
    }

    fn all_digests(&self) -> StoreResult<Vec<Digest>> {
        let map = self.objects.read().expect("lock poisoned");
        let mut digests: Vec<Digest> = map.keys().copied().collect();
        digests.sort();
        Ok(digests)
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::*;

    fn make_blob(content: &[u8]) -> StoredObject {
        Blob::new(content.to_vec()).to_stored_object()
    }

    fn make_tree() -> StoredObject {
        let tree = Tree::new(vec![
            TreeEntry::item("Run", Digest::from_bytes(b"run")),
            TreeEntry::container("Morning", Digest::from_bytes(b"morning")),
        ]);
        tree.to_stored_object().unwrap()
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get_blob() {
        let store = InMemoryObjectStore::new();
        let obj = make_blob(b"run daily");
        let outcome = store.put(&obj).unwrap();
        assert!(!outcome.digest.is_null());
        assert!(!outcome.deduplicated);

        let read_back = store.get(&outcome.digest).unwrap().expect("should exist");
        assert_eq!(read_back, obj);
    }

    #[test]
    fn put_and_get_tree() {
        let store = InMemoryObjectStore::new();
        let obj = make_tree();
        let outcome = store.put(&obj).unwrap();

        let read_back = store.get(&outcome.digest).unwrap().expect("should exist");
        assert_eq!(read_back.kind, ObjectKind::Tree);

        let tree = Tree::from_stored_object(&read_back).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.get("Run").is_some());
    }

    #[test]
    fn get_missing_object_returns_none() {
        let store = InMemoryObjectStore::new();
        let digest = Digest::from_bytes(b"missing");
        assert!(store.get(&digest).unwrap().is_none());
    }

    // -----------------------------------------------------------------------
    // Dedup
    // -----------------------------------------------------------------------

    #[test]
    fn second_put_is_deduplicated() {
        let store = InMemoryObjectStore::new();
        let obj = make_blob(b"identical content");
        let first = store.put(&obj).unwrap();
        let second = store.put(&obj).unwrap();
        assert_eq!(first.digest, second.digest);
        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        // Only one object stored.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn different_content_produces_different_digests() {
        let store = InMemoryObjectStore::new();
        let d1 = store.put(&make_blob(b"aaa")).unwrap().digest;
        let d2 = store.put(&make_blob(b"bbb")).unwrap().digest;
        assert_ne!(d1, d2);
        assert_eq!(store.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Exists / Delete
    // -----------------------------------------------------------------------

    #[test]
    fn exists_for_missing_object() {
        let store = InMemoryObjectStore::new();
        assert!(!store.exists(&Digest::from_bytes(b"nonexistent")).unwrap());
    }

    #[test]
    fn exists_for_present_object() {
        let store = InMemoryObjectStore::new();
        let digest = store.put(&make_blob(b"present")).unwrap().digest;
        assert!(store.exists(&digest).unwrap());
    }

    #[test]
    fn delete_present_object() {
        let store = InMemoryObjectStore::new();
        let digest = store.put(&make_blob(b"to-delete")).unwrap().digest;
        assert!(store.delete(&digest).unwrap());
        assert!(!store.exists(&digest).unwrap());
        assert!(!store.delete(&digest).unwrap());
        assert!(store.meta(&digest).unwrap().is_none());
    }

    // -----------------------------------------------------------------------
    // Corruption detection
    // -----------------------------------------------------------------------

    #[test]
    fn corrupted_object_is_surfaced() {
        let store = InMemoryObjectStore::new();
        let digest = store.put(&make_blob(b"honest bytes")).unwrap().digest;

        // Corrupt the stored bytes in place, bypassing the public API.
        store
            .objects
            .write()
            .unwrap()
            .get_mut(&digest)
            .unwrap()
            .data[0] ^= 0xFF;

        let err = store.get(&digest).unwrap_err();
        assert!(matches!(err, StoreError::Corruption { .. }));
    }

    // -----------------------------------------------------------------------
    // Access metadata
    // -----------------------------------------------------------------------

    #[test]
    fn get_bumps_access_count() {
        let store = InMemoryObjectStore::new();
        let digest = store.put(&make_blob(b"counted")).unwrap().digest;
        assert_eq!(store.meta(&digest).unwrap().unwrap().access_count, 0);

        store.get(&digest).unwrap();
        store.get(&digest).unwrap();
        assert_eq!(store.meta(&digest).unwrap().unwrap().access_count, 2);
    }

    #[test]
    fn dedup_put_keeps_original_meta() {
        let store = InMemoryObjectStore::new();
        let obj = make_blob(b"original");
        let digest = store.put(&obj).unwrap().digest;
        let created = store.meta(&digest).unwrap().unwrap().created_at;

        store.put(&obj).unwrap();
        assert_eq!(store.meta(&digest).unwrap().unwrap().created_at, created);
    }

    // -----------------------------------------------------------------------
    // Batch operations
    // -----------------------------------------------------------------------

    #[test]
    fn put_batch_and_get_batch() {
        let store = InMemoryObjectStore::new();
        let objects = vec![
            make_blob(b"batch-1"),
            make_blob(b"batch-2"),
            make_blob(b"batch-3"),
        ];
        let outcomes = store.put_batch(&objects).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(store.len(), 3);

        let digests: Vec<Digest> = outcomes.iter().map(|o| o.digest).collect();
        let read_back = store.get_batch(&digests).unwrap();
        for (i, maybe_obj) in read_back.into_iter().enumerate() {
            assert_eq!(maybe_obj.expect("batch object should exist"), objects[i]);
        }
    }

    #[test]
    fn get_batch_with_missing() {
        let store = InMemoryObjectStore::new();
        let d1 = store.put(&make_blob(b"exists")).unwrap().digest;
        let d2 = Digest::from_bytes(b"missing");

        let results = store.get_batch(&[d1, d2]).unwrap();
        assert!(results[0].is_some());
        assert!(results[1].is_none());
    }

    // -----------------------------------------------------------------------
    // Utility methods
    // -----------------------------------------------------------------------

    #[test]
    fn len_and_is_empty() {
        let store = InMemoryObjectStore::new();
        assert!(store.is_empty());
        store.put(&make_blob(b"a")).unwrap();
        assert!(!store.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn total_bytes() {
        let store = InMemoryObjectStore::new();
        store.put(&make_blob(b"12345")).unwrap();
        store.put(&make_blob(b"123456789")).unwrap();
        assert_eq!(store.total_bytes(), 14);
    }

    #[test]
    fn clear_removes_all() {
        let store = InMemoryObjectStore::new();
        store.put(&make_blob(b"a")).unwrap();
        store.put(&make_blob(b"b")).unwrap();
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn all_digests_is_sorted() {
        let store = InMemoryObjectStore::new();
        let d1 = store.put(&make_blob(b"aaa")).unwrap().digest;
        let d2 = store.put(&make_blob(b"bbb")).unwrap().digest;

        let digests = store.all_digests().unwrap();
        assert_eq!(digests.len(), 2);
        for w in digests.windows(2) {
            assert!(w[0] <= w[1]);
        }
        assert!(digests.contains(&d1));
        assert!(digests.contains(&d2));
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryObjectStore::new());
        let digest = store.put(&make_blob(b"shared data")).unwrap().digest;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let obj = store.get(&digest).unwrap().unwrap();
                    assert_eq!(obj.compute_digest(), digest);
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }

    #[test]
    fn concurrent_identical_writes_store_once() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryObjectStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.put(&make_blob(b"same bytes")).unwrap())
            })
            .collect();

        let outcomes: Vec<WriteOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(store.len(), 1);
        // Exactly one writer stored new bytes; the rest were dedup hits.
        assert_eq!(outcomes.iter().filter(|o| !o.deduplicated).count(), 1);
    }
}
