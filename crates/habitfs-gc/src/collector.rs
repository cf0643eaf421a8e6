use std::collections::VecDeque;
use std::sync::Arc;

use habitfs_index::PathIndex;
use habitfs_refs::RefStore;
use habitfs_store::{ObjectKind, ObjectStore, RefCounter, Tree};
use habitfs_types::Digest;
use tracing::{debug, info, warn};

/// Result of one collection cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Objects deleted from the store.
    pub reclaimed: u64,
    /// Path index entries removed alongside them.
    pub paths_removed: u64,
    /// Objects skipped because of per-object errors (retried next cycle).
    pub skipped: u64,
}

/// Reference-counting collector with cascading reclamation.
pub struct GarbageCollector {
    store: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
    counts: Arc<RefCounter>,
    index: Arc<PathIndex>,
}

impl GarbageCollector {
    /// Create a collector over the given stores, counter, and index.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        refs: Arc<dyn RefStore>,
        counts: Arc<RefCounter>,
        index: Arc<PathIndex>,
    ) -> Self {
        Self {
            store,
            refs,
            counts,
            index,
        }
    }

    /// Run one collection cycle.
    ///
    /// Scans for zero-count digests, deletes each object and its path
    /// entries, then handles orphaned children: each child of a deleted
    /// tree has its count recomputed — cascading only over children that
    /// were exclusively referenced by the deleted tree, so a cycle's work
    /// is bounded by reachability from the deleted objects. The count is
    /// re-checked immediately before every delete; anything re-referenced
    /// since the scan is left alone.
    pub fn run(&self) -> GcReport {
        let mut worklist: VecDeque<Digest> = self.counts.zero_digests().into();
        let mut report = GcReport::default();

        while let Some(digest) = worklist.pop_front() {
            // Only ever act on an observed zero.
            if self.counts.count(&digest) != 0 {
                continue;
            }

            let object = match self.store.get(&digest) {
                Ok(found) => found,
                Err(err) => {
                    warn!(digest = %digest, error = %err, "gc read failed; retrying next cycle");
                    report.skipped += 1;
                    continue;
                }
            };

            let Some(object) = object else {
                // Tracked but never stored (or already gone): drop tracking.
                self.counts.remove(&digest);
                continue;
            };

            match self.store.delete(&digest) {
                Ok(true) => {}
                Ok(false) => {
                    self.counts.remove(&digest);
                    continue;
                }
                Err(err) => {
                    warn!(digest = %digest, error = %err, "gc delete failed; retrying next cycle");
                    report.skipped += 1;
                    continue;
                }
            }

            report.reclaimed += 1;
            report.paths_removed += self.index.remove_target(&digest) as u64;
            self.counts.remove(&digest);
            debug!(digest = %digest, "object reclaimed");

            // A reclaimed tree orphans its children: release the hold it
            // took on each, then cascade only over children nothing else
            // references.
            if object.kind == ObjectKind::Tree {
                match Tree::from_stored_object(&object) {
                    Ok(tree) => self.release_children(&tree, &mut worklist),
                    Err(err) => {
                        warn!(digest = %digest, error = %err, "undecodable tree during gc");
                    }
                }
            }
        }

        if report.reclaimed > 0 {
            info!(
                reclaimed = report.reclaimed,
                paths_removed = report.paths_removed,
                "gc cycle complete"
            );
        }
        report
    }

    /// Decrement each child of a deleted tree, recomputing zeros.
    ///
    /// A child that drops to zero but is still embedded in another live
    /// tree (or targeted by a reference) was shared, not exclusive: its
    /// count is repaired and it is retained. Truly exclusive children
    /// join the worklist.
    fn release_children(&self, tree: &Tree, worklist: &mut VecDeque<Digest>) {
        for entry in &tree.entries {
            match self.counts.decrement(&entry.target) {
                Ok(0) => {
                    if self.still_referenced(&entry.target) {
                        self.counts.increment(&entry.target);
                        debug!(digest = %entry.target, "shared child retained");
                    } else {
                        worklist.push_back(entry.target);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(digest = %entry.target, error = %err, "gc child decrement failed");
                }
            }
        }
    }

    /// Returns `true` if any live reference or stored tree points at the
    /// digest.
    fn still_referenced(&self, digest: &Digest) -> bool {
        match self.refs.list("") {
            Ok(refs) => {
                if refs.iter().any(|r| r.target == *digest) {
                    return true;
                }
            }
            Err(err) => {
                // Can't prove it's orphaned: keep it.
                warn!(error = %err, "gc ref scan failed; retaining child");
                return true;
            }
        }

        let digests = match self.store.all_digests() {
            Ok(digests) => digests,
            Err(err) => {
                warn!(error = %err, "gc store scan failed; retaining child");
                return true;
            }
        };
        for candidate in digests {
            let Ok(Some(object)) = self.store.get(&candidate) else {
                continue;
            };
            if object.kind != ObjectKind::Tree {
                continue;
            }
            if let Ok(tree) = Tree::from_stored_object(&object) {
                if tree.entries.iter().any(|e| e.target == *digest) {
                    return true;
                }
            }
        }
        false
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector").finish()
    }
}
