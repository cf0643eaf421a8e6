//! Core reference types.

use habitfs_types::{DeviceId, Digest, Timestamp};
use serde::{Deserialize, Serialize};

/// A named mutable pointer to an immutable object's digest.
///
/// Created when a container is first populated; updated only via
/// compare-and-swap on `version`; deleted only when its owning container
/// is deleted. The pointed-to tree is immutable — a reference moving
/// forward is what makes a mutation visible.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Container name (e.g. "folder/2").
    pub name: String,
    /// Digest of the tree this reference currently points to.
    pub target: Digest,
    /// Device that created the reference.
    pub owner: DeviceId,
    /// Monotonic version, bumped on every successful swap.
    pub version: u64,
    /// When the reference last moved. Volatile; never hashed.
    pub updated_at: Timestamp,
}

impl Reference {
    /// A freshly created reference at version 1.
    pub fn new(name: impl Into<String>, target: Digest, owner: DeviceId) -> Self {
        Self {
            name: name.into(),
            target,
            owner,
            version: 1,
            updated_at: Timestamp::now(),
        }
    }

    /// This reference advanced to a new target with the version bumped.
    pub fn advanced(&self, new_target: Digest) -> Self {
        Self {
            name: self.name.clone(),
            target: new_target,
            owner: self.owner,
            version: self.version + 1,
            updated_at: Timestamp::now(),
        }
    }
}
