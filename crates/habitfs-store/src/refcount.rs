use std::collections::HashMap;
use std::sync::RwLock;

use habitfs_types::Digest;
use tracing::debug;

/// A digest's reference count snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefCount {
    /// Number of live references (refs and tree entries) to the digest.
    pub count: u64,
    /// `true` when more than one reference shares the object.
    pub shared: bool,
}

impl RefCount {
    fn from_count(count: u64) -> Self {
        Self {
            count,
            shared: count > 1,
        }
    }
}

/// Errors from reference counting.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RefCountError {
    /// Decrement on a digest whose count is already zero. Every live
    /// reference must hold `count >= 1`, so this is a correctness bug in
    /// the caller, not a transient condition.
    #[error("refcount underflow for {digest}")]
    Underflow { digest: Digest },
}

/// Tracks how many refs and tree entries point at each object.
///
/// `count == 0` is the only condition under which the garbage collector
/// may delete an object. Decrementing to zero marks the object eligible
/// but never deletes it synchronously — reclamation is decoupled from the
/// hot path.
///
/// Increment and decrement are atomic relative to concurrent calls on the
/// same digest.
pub struct RefCounter {
    counts: RwLock<HashMap<Digest, u64>>,
}

impl RefCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self {
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// Increment the count for a digest, returning the new count.
    pub fn increment(&self, digest: &Digest) -> u64 {
        let mut counts = self.counts.write().expect("lock poisoned");
        let count = counts.entry(*digest).or_insert(0);
        *count += 1;
        *count
    }

    /// Decrement the count for a digest, returning the new count.
    ///
    /// Reaching zero marks the object GC-eligible; the entry is retained
    /// (at zero) so the collector can find it.
    pub fn decrement(&self, digest: &Digest) -> Result<u64, RefCountError> {
        let mut counts = self.counts.write().expect("lock poisoned");
        match counts.get_mut(digest) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    debug!(digest = %digest, "refcount reached zero");
                }
                Ok(*count)
            }
            _ => Err(RefCountError::Underflow { digest: *digest }),
        }
    }

    /// Current count for a digest (zero if untracked).
    pub fn count(&self, digest: &Digest) -> u64 {
        let counts = self.counts.read().expect("lock poisoned");
        counts.get(digest).copied().unwrap_or(0)
    }

    /// Snapshot of a digest's count and shared flag.
    pub fn get(&self, digest: &Digest) -> RefCount {
        RefCount::from_count(self.count(digest))
    }

    /// Returns `true` if more than one reference shares the digest.
    pub fn is_shared(&self, digest: &Digest) -> bool {
        self.count(digest) > 1
    }

    /// Digests whose count has reached zero (GC candidates), sorted.
    pub fn zero_digests(&self) -> Vec<Digest> {
        let counts = self.counts.read().expect("lock poisoned");
        let mut zeros: Vec<Digest> = counts
            .iter()
            .filter(|(_, &c)| c == 0)
            .map(|(d, _)| *d)
            .collect();
        zeros.sort();
        zeros
    }

    /// Number of digests currently shared by more than one reference.
    pub fn shared_count(&self) -> usize {
        let counts = self.counts.read().expect("lock poisoned");
        counts.values().filter(|&&c| c > 1).count()
    }

    /// Drop tracking for a digest entirely (after the object is reclaimed).
    pub fn remove(&self, digest: &Digest) {
        self.counts.write().expect("lock poisoned").remove(digest);
    }

    /// Number of tracked digests (including zero-count entries).
    pub fn tracked(&self) -> usize {
        self.counts.read().expect("lock poisoned").len()
    }
}

impl Default for RefCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RefCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefCounter")
            .field("tracked", &self.tracked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(b: &[u8]) -> Digest {
        Digest::from_bytes(b)
    }

    #[test]
    fn increment_from_zero() {
        let rc = RefCounter::new();
        let d = digest(b"a");
        assert_eq!(rc.count(&d), 0);
        assert_eq!(rc.increment(&d), 1);
        assert_eq!(rc.increment(&d), 2);
        assert_eq!(rc.count(&d), 2);
    }

    #[test]
    fn decrement_to_zero_keeps_entry() {
        let rc = RefCounter::new();
        let d = digest(b"a");
        rc.increment(&d);
        assert_eq!(rc.decrement(&d).unwrap(), 0);
        // Entry is retained at zero so the collector can find it.
        assert_eq!(rc.tracked(), 1);
        assert_eq!(rc.zero_digests(), vec![d]);
    }

    #[test]
    fn decrement_untracked_is_underflow() {
        let rc = RefCounter::new();
        let d = digest(b"a");
        let err = rc.decrement(&d).unwrap_err();
        assert_eq!(err, RefCountError::Underflow { digest: d });
    }

    #[test]
    fn decrement_below_zero_is_underflow() {
        let rc = RefCounter::new();
        let d = digest(b"a");
        rc.increment(&d);
        rc.decrement(&d).unwrap();
        assert!(rc.decrement(&d).is_err());
    }

    #[test]
    fn shared_flag_tracks_count() {
        let rc = RefCounter::new();
        let d = digest(b"a");
        rc.increment(&d);
        assert!(!rc.is_shared(&d));
        rc.increment(&d);
        assert!(rc.is_shared(&d));
        assert_eq!(rc.get(&d), RefCount { count: 2, shared: true });
        rc.decrement(&d).unwrap();
        assert!(!rc.is_shared(&d));
    }

    #[test]
    fn zero_digests_only_lists_zeros() {
        let rc = RefCounter::new();
        let a = digest(b"a");
        let b = digest(b"b");
        rc.increment(&a);
        rc.increment(&b);
        rc.decrement(&a).unwrap();
        assert_eq!(rc.zero_digests(), vec![a]);
    }

    #[test]
    fn shared_count() {
        let rc = RefCounter::new();
        let a = digest(b"a");
        let b = digest(b"b");
        rc.increment(&a);
        rc.increment(&a);
        rc.increment(&b);
        assert_eq!(rc.shared_count(), 1);
    }

    #[test]
    fn remove_drops_tracking() {
        let rc = RefCounter::new();
        let d = digest(b"a");
        rc.increment(&d);
        rc.decrement(&d).unwrap();
        rc.remove(&d);
        assert_eq!(rc.tracked(), 0);
        assert!(rc.zero_digests().is_empty());
    }

    #[test]
    fn concurrent_increments_are_atomic() {
        use std::sync::Arc;
        use std::thread;

        let rc = Arc::new(RefCounter::new());
        let d = digest(b"contended");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rc = Arc::clone(&rc);
                thread::spawn(move || {
                    for _ in 0..100 {
                        rc.increment(&d);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(rc.count(&d), 800);
    }

    #[test]
    fn concurrent_increment_decrement_balance() {
        use std::sync::Arc;
        use std::thread;

        let rc = Arc::new(RefCounter::new());
        let d = digest(b"balanced");
        // Pre-charge so decrements never race below zero.
        for _ in 0..400 {
            rc.increment(&d);
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let rc = Arc::clone(&rc);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    rc.increment(&d);
                }
            }));
        }
        for _ in 0..4 {
            let rc = Arc::clone(&rc);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    rc.decrement(&d).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(rc.count(&d), 400);
    }
}
