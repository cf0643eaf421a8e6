use habitfs_types::Digest;

/// How a copy materializes its items in the target container.
///
/// Only the copy-on-write path rewrites content; the link modes are new
/// names for the same digest, which under content addressing is exactly
/// what a link is. `Deep` dispatches to the rewrite path as well — a
/// forced byte copy of identical content collapses to the same stored
/// object, so a separate code path would be unobservable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CopyMode {
    /// Share the source object under a new name.
    HardLink,
    /// Share the source object under a new name, marked as a soft link by
    /// the caller's transform.
    SoftLink,
    /// Transform content and share unchanged subtrees.
    Cow,
    /// Transform content; identical results still deduplicate.
    Deep,
}

impl CopyMode {
    /// Returns `true` when this mode stores transformed payload bytes
    /// rather than sharing the source object.
    pub fn rewrites_content(&self) -> bool {
        matches!(self, Self::Cow | Self::Deep)
    }
}

impl std::fmt::Display for CopyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::HardLink => "hard-link",
            Self::SoftLink => "soft-link",
            Self::Cow => "cow",
            Self::Deep => "deep",
        };
        write!(f, "{s}")
    }
}

/// Retry/backoff parameters for the swap loop.
#[derive(Clone, Debug)]
pub struct CopyConfig {
    /// Maximum swap attempts before surfacing `Conflict`.
    pub max_attempts: u32,
    /// Base backoff between attempts; doubles per attempt, plus jitter.
    pub backoff_base_ms: u64,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 10,
        }
    }
}

/// A source item that could not be copied, with the reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedItem {
    /// Digest of the source item.
    pub source: Digest,
    /// Human-readable failure reason.
    pub reason: String,
}

/// Outcome of a copy: per-item successes and failures plus the published
/// tree.
///
/// Partial success is a first-class result, not an error. When every item
/// fails, the target reference is left untouched and `new_tree`/`
/// new_version` report the reference's current state.
#[derive(Clone, Debug)]
pub struct CopyOutcome {
    /// Digests committed into the target tree, in source order.
    pub committed: Vec<Digest>,
    /// Items that failed, with reasons, in source order.
    pub failed: Vec<FailedItem>,
    /// Digest of the tree the target reference points to after the copy.
    pub new_tree: Digest,
    /// Version of the target reference after the copy.
    pub new_version: u64,
}

impl CopyOutcome {
    /// Returns `true` if every requested item committed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
