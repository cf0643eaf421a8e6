use habitfs_crypto::ContentHasher;
use habitfs_types::{Digest, Timestamp};
use serde::{Deserialize, Serialize};

/// One resolved path in the derived index.
///
/// Derived state: rebuildable from the reference store and trees at any
/// time, never a source of truth. The lease (`expires_at`) bounds cache
/// staleness for readers that miss an invalidation broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    /// Digest of the full path string (stable key for invalidation).
    pub path_digest: Digest,
    /// The full logical path, e.g. `"folder/1/Run"`.
    pub full_path: String,
    /// Digest of the object the path resolves to.
    pub target: Digest,
    /// Path digest of the parent path, if any.
    pub parent_path_digest: Option<Digest>,
    /// Number of path segments.
    pub depth: u32,
    /// Whether the target is a container (tree).
    pub is_container: bool,
    /// Lease expiry; the entry must not be served past this instant.
    pub expires_at: Timestamp,
}

impl PathEntry {
    /// Build an entry for a path, deriving the digest keys from the path
    /// strings.
    pub fn new(
        full_path: impl Into<String>,
        target: Digest,
        is_container: bool,
        expires_at: Timestamp,
    ) -> Self {
        let full_path = full_path.into();
        let parent_path_digest = parent_path(&full_path).map(path_digest);
        Self {
            path_digest: path_digest(&full_path),
            depth: full_path.split('/').count() as u32,
            full_path,
            target,
            parent_path_digest,
            is_container,
            expires_at,
        }
    }

    /// Returns `true` if the lease has lapsed at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// Digest of a path string (domain-separated from object digests).
pub fn path_digest(path: &str) -> Digest {
    ContentHasher::PATH.hash(path.as_bytes())
}

/// The parent of a path, or `None` for a single-segment path.
fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}
