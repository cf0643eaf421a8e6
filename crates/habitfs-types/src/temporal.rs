use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Wall-clock timestamp in milliseconds since the UNIX epoch.
///
/// Timestamps are volatile metadata: they are never part of any hashed
/// representation. Ordering between concurrent writers is owned by
/// reference versions, not clocks, so a plain wall-clock value is enough
/// for audit records and cache leases.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Timestamp {
    /// Milliseconds since the UNIX epoch.
    pub ms: u64,
}

impl Timestamp {
    /// Create a timestamp with an explicit value.
    pub const fn from_ms(ms: u64) -> Self {
        Self { ms }
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self { ms }
    }

    /// The zero timestamp (epoch).
    pub const fn zero() -> Self {
        Self { ms: 0 }
    }

    /// This timestamp advanced by the given number of milliseconds.
    pub const fn plus_ms(&self, ms: u64) -> Self {
        Self {
            ms: self.ms.saturating_add(ms),
        }
    }

    /// Returns `true` if this timestamp is strictly before `other`.
    pub fn is_before(&self, other: &Self) -> bool {
        self < other
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.ms)
    }
}
