use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use habitfs_cache::LayeredCache;
use habitfs_gc::{GarbageCollector, GcReport};
use habitfs_index::PathIndex;
use habitfs_refs::{InMemoryRefStore, RefStore, Reference};
use habitfs_store::{
    InMemoryObjectStore, ObjectKind, ObjectStore, RefCounter, StoredObject, Tree,
};
use habitfs_sync::{EventFilter, EventPayload, SyncEvent, SyncNotifier};
use habitfs_tree::{ContentTransform, CopyMode, FailedItem, TreeBuilder};
use habitfs_txn::{Journal, OpKind, TransactionLog, TransactionRecord, TxnId, TxnStatus};
use habitfs_types::{DeviceId, Digest};

use crate::config::StoreConfig;
use crate::error::{SdkError, SdkResult};
use crate::stats::{LatencyTracker, StoreStats};

/// Receipt for a completed copy: per-item results, the published tree,
/// and the wrapping transaction.
#[derive(Clone, Debug)]
pub struct CopyReceipt {
    /// Digests committed into the target tree, in source order.
    pub committed: Vec<Digest>,
    /// Items that failed, with reasons.
    pub failed: Vec<FailedItem>,
    /// Digest of the tree the target reference points to after the copy.
    pub new_tree: Digest,
    /// Version of the target reference after the copy.
    pub new_version: u64,
    /// The transaction that wrapped this copy.
    pub txn: TxnId,
}

/// The habitfs facade: one owned instance per session.
///
/// Construction wires each subsystem with explicitly injected state —
/// there are no process-wide singletons. All methods are `&self` and
/// thread-safe; share the store across handlers with an `Arc`.
pub struct FolderStore {
    device: DeviceId,
    objects: Arc<InMemoryObjectStore>,
    refs: Arc<InMemoryRefStore>,
    counts: Arc<RefCounter>,
    builder: TreeBuilder,
    index: Arc<PathIndex>,
    cache: Arc<LayeredCache<String, Digest>>,
    txns: TransactionLog,
    notifier: Arc<SyncNotifier>,
    gc: GarbageCollector,
    latency: LatencyTracker,
}

impl FolderStore {
    /// Create a store with in-memory backends and no durable journal.
    pub fn new(config: StoreConfig) -> Self {
        Self::build(config, TransactionLog::new())
    }

    /// Create a store whose transaction log appends to a durable journal.
    pub fn with_journal(config: StoreConfig, journal: Journal) -> Self {
        Self::build(config, TransactionLog::with_journal(journal))
    }

    /// Recover a store from a journal after a crash.
    ///
    /// Interrupted transactions stay Pending and are surfaced by
    /// [`FolderStore::incomplete_txns`] for reconciliation.
    pub fn recover(config: StoreConfig, journal: Journal) -> SdkResult<Self> {
        let txns = TransactionLog::recover(journal)?;
        Ok(Self::build(config, txns))
    }

    fn build(config: StoreConfig, txns: TransactionLog) -> Self {
        let objects = Arc::new(InMemoryObjectStore::new());
        let refs = Arc::new(InMemoryRefStore::new());
        let counts = Arc::new(RefCounter::new());
        let index = Arc::new(PathIndex::new(config.index.clone()));
        let cache = Arc::new(LayeredCache::new(config.cache.clone()));
        let notifier = Arc::new(SyncNotifier::new(config.notifier.clone()));

        let builder = TreeBuilder::new(
            Arc::clone(&objects) as Arc<dyn ObjectStore>,
            Arc::clone(&refs) as Arc<dyn RefStore>,
            Arc::clone(&counts),
            config.copy.clone(),
        );
        let gc = GarbageCollector::new(
            Arc::clone(&objects) as Arc<dyn ObjectStore>,
            Arc::clone(&refs) as Arc<dyn RefStore>,
            Arc::clone(&counts),
            Arc::clone(&index),
        );

        info!(device = %config.device, "folder store ready");
        Self {
            device: config.device,
            objects,
            refs,
            counts,
            builder,
            index,
            cache,
            txns,
            notifier,
            gc,
            latency: LatencyTracker::new(),
        }
    }

    // ---------------------------------------------------------------
    // Object operations
    // ---------------------------------------------------------------

    /// Store a payload, deduplicating by content, and take a reference to
    /// it.
    ///
    /// Putting identical content twice returns the same digest, stores the
    /// bytes once, and leaves the reference count at two.
    pub fn put_object(&self, kind: ObjectKind, payload: Vec<u8>) -> SdkResult<Digest> {
        let start = Instant::now();
        let outcome = self.objects.put(&StoredObject::new(kind, payload))?;
        self.counts.increment(&outcome.digest);
        if outcome.deduplicated {
            debug!(digest = %outcome.digest, "put deduplicated");
        }
        self.latency.record(start);
        Ok(outcome.digest)
    }

    /// Read a payload by digest.
    pub fn get_object(&self, digest: &Digest) -> SdkResult<Vec<u8>> {
        let start = Instant::now();
        let object = self
            .objects
            .get(digest)?
            .ok_or(SdkError::ObjectNotFound(*digest))?;
        self.latency.record(start);
        Ok(object.data)
    }

    // ---------------------------------------------------------------
    // Containers and references
    // ---------------------------------------------------------------

    /// Create an empty container with a fresh reference.
    pub fn create_container(&self, name: &str) -> SdkResult<Reference> {
        let start = Instant::now();
        let tree = Tree::empty();
        let outcome = self.objects.put(&tree.to_stored_object()?)?;
        let txn = self
            .txns
            .begin(self.device, OpKind::RefUpdate, vec![outcome.digest])?;

        self.counts.increment(&outcome.digest);
        match self.refs.create(name, outcome.digest, self.device) {
            Ok(reference) => {
                self.index.rebuild_container(name, outcome.digest, &tree);
                self.cache.insert(name.to_string(), outcome.digest);
                self.txns.complete(txn, TxnStatus::Committed)?;
                self.latency.record(start);
                Ok(reference)
            }
            Err(err) => {
                if let Err(rollback) = self.counts.decrement(&outcome.digest) {
                    warn!(error = %rollback, "create rollback decrement failed");
                }
                self.txns.complete(txn, TxnStatus::RolledBack)?;
                Err(err.into())
            }
        }
    }

    /// List all container references, sorted by name.
    pub fn list_containers(&self) -> SdkResult<Vec<Reference>> {
        Ok(self.refs.list("")?)
    }

    /// Resolve a reference by name.
    pub fn resolve_ref(&self, name: &str) -> SdkResult<Reference> {
        self.refs
            .resolve(name)
            .map_err(SdkError::from)?
            .ok_or_else(|| SdkError::RefNotFound(name.to_string()))
    }

    /// Delete a container's reference, releasing its tree.
    ///
    /// The tree and its contents stay resolvable by digest until the
    /// collector reclaims whatever nothing else holds. Returns `false`
    /// if the container did not exist.
    pub fn delete_container(&self, name: &str) -> SdkResult<bool> {
        let Some(reference) = self.refs.resolve(name).map_err(SdkError::from)? else {
            return Ok(false);
        };
        let txn = self
            .txns
            .begin(self.device, OpKind::RefUpdate, vec![reference.target])?;

        self.refs.delete(name).map_err(SdkError::from)?;
        self.counts.decrement(&reference.target)?;
        self.cache.evict(&name.to_string());
        self.index.remove_path(name);
        self.notifier.invalidate(vec![name.to_string()], self.device);
        self.txns.complete(txn, TxnStatus::Committed)?;
        Ok(true)
    }

    /// Atomically repoint a reference, optimistic-locking on its version.
    ///
    /// The new target's reference count is incremented before the swap
    /// makes it visible; the old target is released after.
    pub fn update_ref(
        &self,
        name: &str,
        expected_version: u64,
        new_target: Digest,
    ) -> SdkResult<u64> {
        let start = Instant::now();
        let txn = self
            .txns
            .begin(self.device, OpKind::RefUpdate, vec![new_target])?;
        let result = self.update_ref_inner(name, expected_version, new_target);
        let status = if result.is_ok() {
            TxnStatus::Committed
        } else {
            TxnStatus::RolledBack
        };
        self.txns.complete(txn, status)?;
        self.latency.record(start);
        result
    }

    fn update_ref_inner(
        &self,
        name: &str,
        expected_version: u64,
        new_target: Digest,
    ) -> SdkResult<u64> {
        let current = self
            .refs
            .resolve(name)
            .map_err(SdkError::from)?
            .ok_or_else(|| SdkError::RefNotFound(name.to_string()))?;
        if current.version != expected_version {
            return Err(SdkError::Conflict {
                name: name.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }

        // Reclaim-proof before visible.
        self.counts.increment(&new_target);
        match self
            .refs
            .compare_and_swap(name, expected_version, new_target)
        {
            Ok(new_version) => {
                self.counts.decrement(&current.target)?;
                self.after_commit(name, new_target);
                Ok(new_version)
            }
            Err(err) => {
                if let Err(rollback) = self.counts.decrement(&new_target) {
                    warn!(error = %rollback, "swap rollback decrement failed");
                }
                Err(err.into())
            }
        }
    }

    // ---------------------------------------------------------------
    // Path resolution (cache-first)
    // ---------------------------------------------------------------

    /// Resolve a path inside a container to a digest.
    ///
    /// Checks L1, then L2, then the path index, then walks the reference
    /// and trees; every origin hit populates the caches on the way back.
    /// Pass an empty `path` to resolve the container itself.
    pub fn resolve_path(&self, container: &str, path: &str) -> SdkResult<Digest> {
        let start = Instant::now();
        let result = self.resolve_path_inner(container, path);
        self.latency.record(start);
        result
    }

    fn resolve_path_inner(&self, container: &str, path: &str) -> SdkResult<Digest> {
        let full = if path.is_empty() {
            container.to_string()
        } else {
            format!("{container}/{path}")
        };

        if let Some(digest) = self.cache.get(&full) {
            return Ok(digest);
        }
        if let Some(entry) = self.index.resolve(&full) {
            self.cache.insert(full, entry.target);
            return Ok(entry.target);
        }

        // Origin: reference, then tree descent.
        let reference = self
            .refs
            .resolve(container)
            .map_err(SdkError::from)?
            .ok_or_else(|| SdkError::PathNotFound(full.clone()))?;
        let mut current = reference.target;
        let mut is_container = true;

        if !path.is_empty() {
            for segment in path.split('/') {
                let object = self
                    .objects
                    .get(&current)?
                    .ok_or(SdkError::ObjectNotFound(current))?;
                if object.kind != ObjectKind::Tree {
                    return Err(SdkError::PathNotFound(full));
                }
                let tree = Tree::from_stored_object(&object)?;
                let entry = tree
                    .get(segment)
                    .ok_or_else(|| SdkError::PathNotFound(full.clone()))?;
                current = entry.target;
                is_container = entry.is_container;
            }
        }

        self.index.insert(&full, current, is_container);
        self.cache.insert(full, current);
        Ok(current)
    }

    // ---------------------------------------------------------------
    // Copy-on-write
    // ---------------------------------------------------------------

    /// Copy source items into a target container, transforming content.
    ///
    /// Wrapped in a transaction: Committed on success (partial per-item
    /// failure included), RolledBack with compensating decrements on
    /// total failure. After a successful swap the path index is rebuilt
    /// for the container, the writer's cache entries are evicted
    /// synchronously, and an invalidation broadcast is queued for other
    /// readers.
    pub fn cow_copy(
        &self,
        sources: &[Digest],
        target_ref: &str,
        mode: CopyMode,
        transform: &dyn ContentTransform,
    ) -> SdkResult<CopyReceipt> {
        let start = Instant::now();
        let txn = self
            .txns
            .begin(self.device, OpKind::CowCopy, sources.to_vec())?;

        match self
            .builder
            .cow_copy(sources, target_ref, mode, transform, self.device)
        {
            Ok(outcome) => {
                if !outcome.committed.is_empty() {
                    self.after_commit(target_ref, outcome.new_tree);
                }
                self.txns.complete(txn, TxnStatus::Committed)?;
                self.latency.record(start);
                Ok(CopyReceipt {
                    committed: outcome.committed,
                    failed: outcome.failed,
                    new_tree: outcome.new_tree,
                    new_version: outcome.new_version,
                    txn,
                })
            }
            Err(err) => {
                // The builder compensated its own charges already.
                self.txns.complete(txn, TxnStatus::RolledBack)?;
                Err(err.into())
            }
        }
    }

    /// Post-commit maintenance: incremental index rebuild, synchronous
    /// writer-side cache eviction, and the invalidation broadcast.
    ///
    /// Never load-bearing — failures are logged, the commit stands.
    fn after_commit(&self, container: &str, new_tree: Digest) {
        let mut affected = vec![container.to_string()];
        self.cache.evict(&container.to_string());

        match self.objects.get(&new_tree) {
            Ok(Some(object)) if object.kind == ObjectKind::Tree => {
                match Tree::from_stored_object(&object) {
                    Ok(tree) => {
                        self.index.rebuild_container(container, new_tree, &tree);
                        for entry in &tree.entries {
                            let child = format!("{container}/{}", entry.name);
                            self.cache.evict(&child);
                            affected.push(child);
                        }
                    }
                    Err(err) => warn!(error = %err, "post-commit tree decode failed"),
                }
            }
            Ok(_) => {
                // Non-tree target: refresh the container entry alone.
                self.index.insert(container, new_tree, false);
            }
            Err(err) => warn!(error = %err, "post-commit tree read failed"),
        }

        self.cache.insert(container.to_string(), new_tree);
        self.notifier.invalidate(affected, self.device);
    }

    // ---------------------------------------------------------------
    // Invalidation
    // ---------------------------------------------------------------

    /// Queue an invalidation broadcast for the given entity ids.
    ///
    /// Fire-and-forget: delivery is at-least-once, and a drop only delays
    /// remote convergence within the path lease.
    pub fn invalidate(&self, ids: Vec<String>) {
        self.notifier.invalidate(ids, self.device);
    }

    /// Apply a received invalidation event to this reader's caches.
    ///
    /// Evicts L1 so the next lookup is served from L2/origin. Events from
    /// this device, and events failing their integrity check, are ignored.
    pub fn apply_invalidation(&self, event: &SyncEvent) {
        if !event.verify_integrity() {
            warn!(id = %event.id, "dropping event with bad integrity hash");
            return;
        }
        if event.origin == self.device {
            return;
        }
        match &event.payload {
            EventPayload::Entities(ids) => {
                for id in ids {
                    self.cache.evict_l1(id);
                }
                debug!(count = ids.len(), "invalidation applied");
            }
            EventPayload::RefUpdate { name, .. } => {
                self.cache.evict_l1(name);
            }
            EventPayload::Reclaimed { .. } => {}
        }
    }

    /// Spawn a task that applies incoming invalidation events to this
    /// store's caches.
    pub fn spawn_invalidation_listener(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut stream = self.notifier.subscribe(EventFilter {
            kinds: None,
            exclude_origin: Some(self.device),
        });
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match stream.recv().await {
                    Ok(event) => match weak.upgrade() {
                        Some(store) => store.apply_invalidation(&event),
                        None => break,
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // At-least-once, not exactly-once: convergence is
                        // covered by the lease.
                        warn!(skipped, "invalidation listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Spawn the periodic maintenance task: TTL purges for the cache and
    /// path index. Never blocks foreground calls.
    pub fn spawn_maintenance(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(store) => {
                        store.cache.purge_expired();
                        store.index.purge_expired();
                    }
                    None => break,
                }
            }
        })
    }

    // ---------------------------------------------------------------
    // Garbage collection and introspection
    // ---------------------------------------------------------------

    /// Run one garbage collection cycle.
    pub fn run_gc(&self) -> SdkResult<GcReport> {
        let txn = self.txns.begin(self.device, OpKind::Gc, vec![])?;
        let report = self.gc.run();
        if report.reclaimed > 0 {
            self.notifier.publish_reclaimed(report.reclaimed, self.device);
        }
        self.txns.complete(txn, TxnStatus::Committed)?;
        Ok(report)
    }

    /// Aggregate statistics for dashboards and tests.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            object_count: self.objects.len(),
            cache_hit_ratio: self.cache.stats().hit_ratio(),
            avg_latency_ms: self.latency.avg_ms(),
            shared_object_count: self.counts.shared_count(),
        }
    }

    /// Transactions that began but never completed (crash casualties).
    pub fn incomplete_txns(&self) -> Vec<TransactionRecord> {
        self.txns.pending()
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    /// This session's device identity.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// The reference counter (for collaborating components and tests).
    pub fn counts(&self) -> &Arc<RefCounter> {
        &self.counts
    }

    /// The invalidation notifier (to wire transports and dispatchers).
    pub fn notifier(&self) -> &Arc<SyncNotifier> {
        &self.notifier
    }
}

impl std::fmt::Debug for FolderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderStore")
            .field("device", &self.device)
            .field("objects", &self.objects.len())
            .finish()
    }
}
