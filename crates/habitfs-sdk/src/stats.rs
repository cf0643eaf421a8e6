use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Aggregate store statistics, as reported by
/// [`crate::FolderStore::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StoreStats {
    /// Objects currently in the store.
    pub object_count: usize,
    /// Cache hits over total lookups.
    pub cache_hit_ratio: f64,
    /// Mean facade operation latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Objects shared by more than one reference.
    pub shared_object_count: usize,
}

/// Lock-free running latency accumulator.
///
/// Facade operations record their wall time here; collection runs on
/// relaxed atomics and never blocks the operations it measures.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    total_micros: AtomicU64,
    samples: AtomicU64,
}

impl LatencyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one operation that started at `start`.
    pub fn record(&self, start: Instant) {
        let micros = start.elapsed().as_micros() as u64;
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Mean recorded latency in milliseconds (zero when nothing was
    /// recorded).
    pub fn avg_ms(&self) -> f64 {
        let samples = self.samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0.0;
        }
        let total = self.total_micros.load(Ordering::Relaxed);
        (total as f64 / samples as f64) / 1_000.0
    }

    /// Number of recorded samples.
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }
}
