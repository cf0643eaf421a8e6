//! The in-memory path index.

use std::collections::HashMap;
use std::sync::RwLock;

use habitfs_store::Tree;
use habitfs_types::{Digest, Timestamp};
use tracing::debug;

use crate::entry::PathEntry;

/// Configuration for the path index.
#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Lease duration for entries, in milliseconds.
    pub lease_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { lease_ms: 30_000 }
    }
}

/// Denormalized path → digest cache.
///
/// Keyed by full path. All operations take the interior lock; none are
/// fallible. Expired entries are dropped lazily on resolve and eagerly by
/// [`PathIndex::purge_expired`], which background maintenance calls on a
/// schedule.
pub struct PathIndex {
    entries: RwLock<HashMap<String, PathEntry>>,
    config: IndexConfig,
}

impl PathIndex {
    /// Create an empty index.
    pub fn new(config: IndexConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Resolve a full path, honoring the lease.
    ///
    /// Expired entries are removed and reported as misses.
    pub fn resolve(&self, full_path: &str) -> Option<PathEntry> {
        let now = Timestamp::now();
        {
            let entries = self.entries.read().expect("lock poisoned");
            match entries.get(full_path) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Lease lapsed: drop the stale entry.
        self.entries
            .write()
            .expect("lock poisoned")
            .remove(full_path);
        None
    }

    /// Insert or replace the entry for a path.
    pub fn insert(&self, full_path: &str, target: Digest, is_container: bool) {
        let expires_at = Timestamp::now().plus_ms(self.config.lease_ms);
        let entry = PathEntry::new(full_path, target, is_container, expires_at);
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(full_path.to_string(), entry);
    }

    /// Rebuild the entries for a mutated container and its direct children.
    ///
    /// Work is proportional to the container's entry count, never to the
    /// total tree size: deeper descendants are left to lease expiry. Stale
    /// direct children (removed from the tree) are dropped.
    pub fn rebuild_container(&self, container: &str, tree_digest: Digest, tree: &Tree) {
        let now = Timestamp::now();
        let expires_at = now.plus_ms(self.config.lease_ms);
        let container_depth = container.split('/').count() as u32;

        let mut entries = self.entries.write().expect("lock poisoned");

        // Drop direct children that are no longer in the tree.
        let prefix = format!("{container}/");
        entries.retain(|path, entry| {
            if !path.starts_with(&prefix) || entry.depth != container_depth + 1 {
                return true;
            }
            let child = &path[prefix.len()..];
            tree.get(child).is_some()
        });

        entries.insert(
            container.to_string(),
            PathEntry::new(container, tree_digest, true, expires_at),
        );
        for te in &tree.entries {
            let child_path = format!("{container}/{}", te.name);
            entries.insert(
                child_path.clone(),
                PathEntry::new(child_path, te.target, te.is_container, expires_at),
            );
        }
        debug!(container, entries = tree.len(), "path index rebuilt");
    }

    /// Remove every entry that resolves to the given digest.
    ///
    /// Called by the garbage collector when the object is reclaimed.
    pub fn remove_target(&self, digest: &Digest) -> usize {
        let mut entries = self.entries.write().expect("lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.target != *digest);
        before - entries.len()
    }

    /// Remove the entry for a single path. Returns `true` if it existed.
    pub fn remove_path(&self, full_path: &str) -> bool {
        self.entries
            .write()
            .expect("lock poisoned")
            .remove(full_path)
            .is_some()
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Timestamp::now();
        let mut entries = self.entries.write().expect("lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.write().expect("lock poisoned").clear();
    }

    /// Number of entries currently held (including not-yet-purged expired
    /// ones).
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }
}

impl Default for PathIndex {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

impl std::fmt::Debug for PathIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathIndex")
            .field("entries", &self.len())
            .finish()
    }
}
