use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use habitfs_refs::{RefError, RefStore};
use habitfs_store::{Blob, ObjectStore, RefCounter, StoreError, Tree, TreeEntry};
use habitfs_types::{DeviceId, Digest};

use crate::copy::{CopyConfig, CopyMode, CopyOutcome, FailedItem};
use crate::error::{CopyError, Result};
use crate::transform::ContentTransform;

/// Copy-on-write tree constructor.
///
/// Holds the object store, reference store, and reference counter; every
/// copy goes through [`TreeBuilder::cow_copy`]. The builder never mutates
/// an existing tree object — it writes a new tree sharing the current
/// entry list and swaps the target reference onto it.
pub struct TreeBuilder {
    store: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
    counts: Arc<RefCounter>,
    config: CopyConfig,
}

impl TreeBuilder {
    /// Create a builder over the given stores.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        refs: Arc<dyn RefStore>,
        counts: Arc<RefCounter>,
        config: CopyConfig,
    ) -> Self {
        Self {
            store,
            refs,
            counts,
            config,
        }
    }

    /// Copy the given source items into the target container.
    ///
    /// Each source blob is passed through `transform` (rewrite modes) or
    /// shared as-is under the transform's derived name (link modes), then
    /// merged into a new tree that carries the current tree's entries
    /// verbatim. The target reference is swapped via compare-and-swap; a
    /// lost swap re-reads, re-merges and retries up to the configured
    /// attempt bound, then surfaces `Conflict` with every reference-count
    /// charge compensated.
    ///
    /// Per-item failures (missing source, transform rejection) never abort
    /// the batch; they are reported in the outcome's failure list.
    pub fn cow_copy(
        &self,
        sources: &[Digest],
        target_ref: &str,
        mode: CopyMode,
        transform: &dyn ContentTransform,
        owner: DeviceId,
    ) -> Result<CopyOutcome> {
        let mut committed: Vec<Digest> = Vec::new();
        let mut failed: Vec<FailedItem> = Vec::new();
        let mut new_entries: Vec<TreeEntry> = Vec::new();
        // Every increment made before the swap, for compensation if the
        // copy ultimately fails.
        let mut charged: Vec<Digest> = Vec::new();

        for source in sources {
            let object = match self.store.get(source) {
                Ok(Some(obj)) => obj,
                Ok(None) => {
                    failed.push(FailedItem {
                        source: *source,
                        reason: "source object not found".into(),
                    });
                    continue;
                }
                // Corruption and I/O are fatal to the whole operation.
                Err(err) => {
                    self.rollback(&charged);
                    return Err(err.into());
                }
            };
            let blob = match Blob::from_stored_object(&object) {
                Ok(blob) => blob,
                Err(err) => {
                    failed.push(FailedItem {
                        source: *source,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let output = match transform.apply(source, &blob.data) {
                Ok(output) => output,
                Err(err) => {
                    failed.push(FailedItem {
                        source: *source,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let target = if mode.rewrites_content() {
                let stored = Blob::new(output.payload).to_stored_object();
                match self.store.put(&stored) {
                    Ok(outcome) => {
                        // Identical transformed content collapses to one
                        // stored object; each item still takes its own
                        // reference count below.
                        if outcome.deduplicated {
                            debug!(digest = %outcome.digest, "copy deduplicated");
                        }
                        outcome.digest
                    }
                    Err(err) => {
                        self.rollback(&charged);
                        return Err(err.into());
                    }
                }
            } else {
                // Link modes: a new name for the same digest.
                *source
            };

            self.counts.increment(&target);
            charged.push(target);
            committed.push(target);
            new_entries.push(TreeEntry::item(output.entry_name, target));
        }

        if new_entries.is_empty() {
            // Nothing to publish; leave the reference untouched.
            let current = self.refs.resolve(target_ref)?;
            let (new_tree, new_version) = match current {
                Some(r) => (r.target, r.version),
                None => (Digest::null(), 0),
            };
            return Ok(CopyOutcome {
                committed,
                failed,
                new_tree,
                new_version,
            });
        }

        match self.publish(target_ref, &new_entries, owner) {
            Ok((new_tree, new_version)) => {
                debug!(
                    target_ref,
                    %mode,
                    committed = committed.len(),
                    failed = failed.len(),
                    new_tree = %new_tree,
                    "copy committed"
                );
                Ok(CopyOutcome {
                    committed,
                    failed,
                    new_tree,
                    new_version,
                })
            }
            Err(err) => {
                self.rollback(&charged);
                Err(err)
            }
        }
    }

    /// Merge the new entries into the target's current tree and swap the
    /// reference onto the result, retrying on conflict.
    fn publish(
        &self,
        target_ref: &str,
        new_entries: &[TreeEntry],
        owner: DeviceId,
    ) -> Result<(Digest, u64)> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let current = self.refs.resolve(target_ref)?;
            let (base_entries, old_tree) = match &current {
                Some(r) => {
                    let obj = self
                        .store
                        .get(&r.target)?
                        .ok_or(StoreError::NotFound(r.target))?;
                    let tree = Tree::from_stored_object(&obj)?;
                    (tree.entries, Some(r.target))
                }
                None => (Vec::new(), None),
            };

            // Share the current entry list verbatim, then merge.
            let mut merged = Tree::new(base_entries);
            for entry in new_entries {
                merged.upsert(entry.clone());
            }
            let new_tree = self.store.put(&merged.to_stored_object()?)?.digest;

            // The new tree must be reclaim-proof before it becomes
            // visible: increment happens-before the swap.
            self.counts.increment(&new_tree);

            let swapped = match &current {
                Some(r) => self.refs.compare_and_swap(target_ref, r.version, new_tree),
                None => self.refs.create(target_ref, new_tree, owner).map(|r| r.version),
            };

            match swapped {
                Ok(new_version) => {
                    if let Some(old) = old_tree {
                        // The previous tree stays fully resolvable for any
                        // other reference still pointing at it.
                        self.counts.decrement(&old)?;
                    }
                    return Ok((new_tree, new_version));
                }
                Err(RefError::Conflict { .. }) | Err(RefError::AlreadyExists { .. })
                    if attempt < self.config.max_attempts =>
                {
                    self.counts.decrement(&new_tree)?;
                    warn!(target_ref, attempt, "swap lost, retrying");
                    self.backoff(attempt);
                }
                Err(RefError::Conflict { .. }) | Err(RefError::AlreadyExists { .. }) => {
                    self.counts.decrement(&new_tree)?;
                    return Err(CopyError::Conflict {
                        name: target_ref.to_string(),
                        attempts: attempt,
                    });
                }
                Err(err) => {
                    self.counts.decrement(&new_tree)?;
                    return Err(err.into());
                }
            }
        }
    }

    /// Compensate reference-count charges after a failed copy.
    fn rollback(&self, charged: &[Digest]) {
        for digest in charged {
            if let Err(err) = self.counts.decrement(digest) {
                // An underflow here means the count was already wrong;
                // surfaceable only as a log, the copy error wins.
                warn!(digest = %digest, error = %err, "rollback decrement failed");
            }
        }
    }

    /// Exponential backoff with jitter between swap attempts.
    fn backoff(&self, attempt: u32) {
        let base = self.config.backoff_base_ms << (attempt - 1).min(6);
        let jitter = rand::thread_rng().gen_range(0..=self.config.backoff_base_ms);
        thread::sleep(Duration::from_millis(base + jitter));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use habitfs_refs::{InMemoryRefStore, Reference};
    use habitfs_store::InMemoryObjectStore;

    use crate::transform::{TransformError, TransformOutput};

    struct Fixture {
        store: Arc<InMemoryObjectStore>,
        refs: Arc<InMemoryRefStore>,
        counts: Arc<RefCounter>,
        builder: TreeBuilder,
    }

    fn fixture() -> Fixture {
        fixture_with(CopyConfig::default())
    }

    fn fixture_with(config: CopyConfig) -> Fixture {
        let store = Arc::new(InMemoryObjectStore::new());
        let refs = Arc::new(InMemoryRefStore::new());
        let counts = Arc::new(RefCounter::new());
        let builder = TreeBuilder::new(
            store.clone() as Arc<dyn ObjectStore>,
            refs.clone() as Arc<dyn RefStore>,
            counts.clone(),
            config,
        );
        Fixture {
            store,
            refs,
            counts,
            builder,
        }
    }

    fn put_blob(store: &InMemoryObjectStore, data: &[u8]) -> Digest {
        store.put(&Blob::new(data.to_vec()).to_stored_object()).unwrap().digest
    }

    fn suffix_transform(suffix: &'static str) -> impl ContentTransform {
        move |_: &Digest, payload: &[u8]| -> std::result::Result<TransformOutput, TransformError> {
            let name = String::from_utf8_lossy(payload).to_string();
            let new_name = format!("{name}{suffix}");
            Ok(TransformOutput {
                entry_name: new_name.clone(),
                payload: new_name.into_bytes(),
            })
        }
    }

    fn load_tree(store: &InMemoryObjectStore, digest: &Digest) -> Tree {
        Tree::from_stored_object(&store.get(digest).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn cow_copy_into_fresh_container() {
        let fx = fixture();
        let source = put_blob(&fx.store, b"Run");

        let outcome = fx
            .builder
            .cow_copy(
                &[source],
                "folder/2",
                CopyMode::Cow,
                &suffix_transform(" (Link)"),
                DeviceId::new(),
            )
            .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.committed.len(), 1);
        let new_blob = outcome.committed[0];
        assert_ne!(new_blob, source);

        let tree = load_tree(&fx.store, &outcome.new_tree);
        let entry = tree.get("Run (Link)").expect("derived entry");
        assert_eq!(entry.target, new_blob);

        // Reference was created on first populate.
        let reference = fx.refs.resolve("folder/2").unwrap().unwrap();
        assert_eq!(reference.target, outcome.new_tree);
        assert_eq!(reference.version, outcome.new_version);
    }

    #[test]
    fn cow_copy_leaves_source_container_untouched() {
        let fx = fixture();
        let owner = DeviceId::new();
        let source = put_blob(&fx.store, b"Run");

        // Populate folder/1 with the original item.
        let original = fx
            .builder
            .cow_copy(
                &[source],
                "folder/1",
                CopyMode::Cow,
                &suffix_transform(""),
                owner,
            )
            .unwrap();
        let f1_before = fx.refs.resolve("folder/1").unwrap().unwrap();

        // Copy into folder/2 with a rename.
        let copied = fx
            .builder
            .cow_copy(
                &[original.committed[0]],
                "folder/2",
                CopyMode::Cow,
                &suffix_transform(" (Link)"),
                owner,
            )
            .unwrap();

        // folder/1 is unchanged and still resolves to the original tree.
        let f1_after = fx.refs.resolve("folder/1").unwrap().unwrap();
        assert_eq!(f1_before, f1_after);
        let f1_tree = load_tree(&fx.store, &f1_after.target);
        assert_eq!(f1_tree.get("Run").unwrap().target, original.committed[0]);

        // folder/2 has the renamed copy under a different digest.
        let f2_tree = load_tree(&fx.store, &copied.new_tree);
        assert!(f2_tree.get("Run (Link)").is_some());
        assert_ne!(copied.committed[0], original.committed[0]);
    }

    #[test]
    fn second_copy_shares_existing_entries() {
        let fx = fixture();
        let owner = DeviceId::new();
        let a = put_blob(&fx.store, b"Read");
        let b = put_blob(&fx.store, b"Walk");

        fx.builder
            .cow_copy(&[a], "folder/1", CopyMode::Cow, &suffix_transform(""), owner)
            .unwrap();
        let second = fx
            .builder
            .cow_copy(&[b], "folder/1", CopyMode::Cow, &suffix_transform(""), owner)
            .unwrap();

        // The new tree carries the first entry verbatim.
        let tree = load_tree(&fx.store, &second.new_tree);
        assert_eq!(tree.len(), 2);
        assert!(tree.get("Read").is_some());
        assert!(tree.get("Walk").is_some());
        assert_eq!(second.new_version, 2);
    }

    #[test]
    fn identical_transformed_content_collapses() {
        let fx = fixture();
        let a = put_blob(&fx.store, b"Run");
        let b = put_blob(&fx.store, b"Walk");

        // Both sources transform to the same bytes and name.
        let constant = |_: &Digest, _: &[u8]| -> std::result::Result<TransformOutput, TransformError> {
            Ok(TransformOutput {
                entry_name: "Same".to_string(),
                payload: b"same".to_vec(),
            })
        };
        let outcome = fx
            .builder
            .cow_copy(&[a, b], "folder/1", CopyMode::Cow, &constant, DeviceId::new())
            .unwrap();

        assert_eq!(outcome.committed.len(), 2);
        assert_eq!(outcome.committed[0], outcome.committed[1]);
        // One stored object referenced twice.
        assert_eq!(fx.counts.count(&outcome.committed[0]), 2);
    }

    #[test]
    fn per_item_failure_does_not_abort_batch() {
        let fx = fixture();
        let good = put_blob(&fx.store, b"Run");
        let missing = Digest::from_bytes(b"never stored");

        let picky = move |source: &Digest,
                          payload: &[u8]|
              -> std::result::Result<TransformOutput, TransformError> {
            if payload == b"Run" {
                Ok(TransformOutput {
                    entry_name: "Run".to_string(),
                    payload: payload.to_vec(),
                })
            } else {
                Err(TransformError::Rejected(format!("unexpected {source}")))
            }
        };

        let outcome = fx
            .builder
            .cow_copy(
                &[good, missing],
                "folder/1",
                CopyMode::Cow,
                &picky,
                DeviceId::new(),
            )
            .unwrap();

        assert_eq!(outcome.committed.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].source, missing);
        assert!(outcome.failed[0].reason.contains("not found"));

        // The committed item is present in the published tree.
        let tree = load_tree(&fx.store, &outcome.new_tree);
        assert!(tree.get("Run").is_some());
    }

    #[test]
    fn all_items_failed_leaves_ref_untouched() {
        let fx = fixture();
        let owner = DeviceId::new();
        let seed = put_blob(&fx.store, b"Run");
        fx.builder
            .cow_copy(&[seed], "folder/1", CopyMode::Cow, &suffix_transform(""), owner)
            .unwrap();
        let before = fx.refs.resolve("folder/1").unwrap().unwrap();

        let reject_all = |_: &Digest, _: &[u8]| -> std::result::Result<TransformOutput, TransformError> {
            Err(TransformError::Rejected("no".into()))
        };
        let outcome = fx
            .builder
            .cow_copy(
                &[Digest::from_bytes(b"gone")],
                "folder/1",
                CopyMode::Cow,
                &reject_all,
                owner,
            )
            .unwrap();

        assert!(outcome.committed.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.new_tree, before.target);
        assert_eq!(outcome.new_version, before.version);
        let after = fx.refs.resolve("folder/1").unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn link_mode_shares_source_digest() {
        let fx = fixture();
        let source = put_blob(&fx.store, b"Run");
        let name_only = |_: &Digest, _: &[u8]| -> std::result::Result<TransformOutput, TransformError> {
            Ok(TransformOutput {
                entry_name: "Run (Link)".to_string(),
                payload: Vec::new(),
            })
        };

        let outcome = fx
            .builder
            .cow_copy(
                &[source],
                "folder/2",
                CopyMode::HardLink,
                &name_only,
                DeviceId::new(),
            )
            .unwrap();

        // No new blob: the entry points at the source object itself.
        assert_eq!(outcome.committed, vec![source]);
        let tree = load_tree(&fx.store, &outcome.new_tree);
        assert_eq!(tree.get("Run (Link)").unwrap().target, source);
        assert_eq!(fx.counts.count(&source), 1);
    }

    #[test]
    fn refcounts_after_successful_copy() {
        let fx = fixture();
        let owner = DeviceId::new();
        let source = put_blob(&fx.store, b"Run");

        let first = fx
            .builder
            .cow_copy(&[source], "folder/1", CopyMode::Cow, &suffix_transform(""), owner)
            .unwrap();
        assert_eq!(fx.counts.count(&first.new_tree), 1);
        assert_eq!(fx.counts.count(&first.committed[0]), 1);

        let second = fx
            .builder
            .cow_copy(
                &[first.committed[0]],
                "folder/1",
                CopyMode::Cow,
                &suffix_transform(" again"),
                owner,
            )
            .unwrap();
        // The old tree was released, the new one holds exactly one count.
        assert_eq!(fx.counts.count(&first.new_tree), 0);
        assert_eq!(fx.counts.count(&second.new_tree), 1);
    }

    #[test]
    fn decrementing_old_tree_keeps_it_resolvable() {
        let fx = fixture();
        let owner = DeviceId::new();
        let source = put_blob(&fx.store, b"Run");

        let first = fx
            .builder
            .cow_copy(&[source], "folder/1", CopyMode::Cow, &suffix_transform(""), owner)
            .unwrap();
        fx.builder
            .cow_copy(&[source], "folder/1", CopyMode::Cow, &suffix_transform(" 2"), owner)
            .unwrap();

        // The superseded tree object still exists until the collector runs.
        assert!(fx.store.exists(&first.new_tree).unwrap());
        let old = load_tree(&fx.store, &first.new_tree);
        assert!(old.get("Run").is_some());
    }

    #[test]
    fn concurrent_copies_to_same_container_both_land() {
        use std::thread;

        let fx = fixture_with(CopyConfig {
            max_attempts: 16,
            backoff_base_ms: 1,
        });
        let owner = DeviceId::new();
        let a = put_blob(&fx.store, b"Read");
        let b = put_blob(&fx.store, b"Walk");

        let builder = Arc::new(fx.builder);
        let b1 = Arc::clone(&builder);
        let b2 = Arc::clone(&builder);

        let h1 = thread::spawn(move || {
            b1.cow_copy(&[a], "folder/1", CopyMode::Cow, &suffix_transform(""), owner)
        });
        let h2 = thread::spawn(move || {
            b2.cow_copy(&[b], "folder/1", CopyMode::Cow, &suffix_transform(""), owner)
        });

        h1.join().unwrap().unwrap();
        h2.join().unwrap().unwrap();

        // The loser re-merged onto the winner's tree: both entries landed.
        let final_ref = fx.refs.resolve("folder/1").unwrap().unwrap();
        let tree = load_tree(&fx.store, &final_ref.target);
        assert_eq!(tree.len(), 2);
        assert!(tree.get("Read").is_some());
        assert!(tree.get("Walk").is_some());
    }

    // A ref store whose swaps always lose, to exercise the retry bound.
    struct AlwaysConflicting {
        inner: InMemoryRefStore,
    }

    impl RefStore for AlwaysConflicting {
        fn create(&self, name: &str, target: Digest, owner: DeviceId) -> habitfs_refs::Result<Reference> {
            self.inner.create(name, target, owner)
        }
        fn resolve(&self, name: &str) -> habitfs_refs::Result<Option<Reference>> {
            self.inner.resolve(name)
        }
        fn compare_and_swap(
            &self,
            name: &str,
            expected_version: u64,
            _new_target: Digest,
        ) -> habitfs_refs::Result<u64> {
            Err(RefError::Conflict {
                name: name.to_string(),
                expected: expected_version,
                actual: expected_version + 1,
            })
        }
        fn delete(&self, name: &str) -> habitfs_refs::Result<bool> {
            self.inner.delete(name)
        }
        fn list(&self, prefix: &str) -> habitfs_refs::Result<Vec<Reference>> {
            self.inner.list(prefix)
        }
    }

    #[test]
    fn exhausted_retries_surface_conflict_and_compensate() {
        let store = Arc::new(InMemoryObjectStore::new());
        let refs = Arc::new(AlwaysConflicting {
            inner: InMemoryRefStore::new(),
        });
        let counts = Arc::new(RefCounter::new());
        let owner = DeviceId::new();
        // Seed the ref at an actual stored tree so the merge can load it.
        let seed_tree = store
            .put(&Tree::empty().to_stored_object().unwrap())
            .unwrap()
            .digest;
        refs.inner.create("folder/1", seed_tree, owner).unwrap();

        let builder = TreeBuilder::new(
            store.clone() as Arc<dyn ObjectStore>,
            refs.clone() as Arc<dyn RefStore>,
            counts.clone(),
            CopyConfig {
                max_attempts: 3,
                backoff_base_ms: 1,
            },
        );

        let source = put_blob(&store, b"Run");
        let err = builder
            .cow_copy(&[source], "folder/1", CopyMode::Cow, &suffix_transform(""), owner)
            .unwrap_err();
        assert!(matches!(err, CopyError::Conflict { attempts: 3, .. }));

        // Every charge was compensated: nothing is left pinned.
        assert_eq!(counts.zero_digests().len(), counts.tracked());
    }
}
