use habitfs_types::{DeviceId, Digest, Timestamp};
use serde::{Deserialize, Serialize};

/// Unique identifier for a sync event.
///
/// Content-derived: the BLAKE3 hash of the event's core fields. Duplicate
/// deliveries (at-least-once) carry the same id, so receivers can drop
/// them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    /// Content hash of the event (BLAKE3).
    pub hash: [u8; 32],
}

impl EventId {
    /// Create an `EventId` from a raw hash.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self { hash }
    }

    /// Short hex representation (first 8 hex chars).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.hash[..4])
    }

    /// Full hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evt:{}", self.short_hex())
    }
}

/// Classification of sync events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Cached entries for the carried ids must be dropped.
    CacheInvalidation,
    /// A container reference moved to a new tree.
    RefUpdated,
    /// A garbage collection cycle reclaimed objects.
    ObjectsReclaimed,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CacheInvalidation => "CacheInvalidation",
            Self::RefUpdated => "RefUpdated",
            Self::ObjectsReclaimed => "ObjectsReclaimed",
        };
        write!(f, "{s}")
    }
}

/// Payload data carried by a sync event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    /// Entity ids (paths or cache keys) to invalidate.
    Entities(Vec<String>),
    /// Reference movement details.
    RefUpdate {
        name: String,
        old_target: Option<Digest>,
        new_target: Digest,
    },
    /// Number of objects reclaimed by a collection cycle.
    Reclaimed { count: u64 },
}

/// A single invalidation/change event.
///
/// Every event carries a content-derived id, the origin device (so readers
/// skip their own broadcasts), a wall-clock timestamp, and a BLAKE3
/// integrity hash over (kind, origin, payload, timestamp).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Unique event identifier (content-addressed).
    pub id: EventId,
    /// When the event was created.
    pub timestamp: Timestamp,
    /// Device that produced the event.
    pub origin: DeviceId,
    /// Classification of this event.
    pub kind: EventKind,
    /// Event-specific payload data.
    pub payload: EventPayload,
    /// BLAKE3 integrity hash over the core fields.
    pub integrity_hash: [u8; 32],
}

impl SyncEvent {
    /// Build a new event, computing its integrity hash and id.
    pub fn new(
        timestamp: Timestamp,
        origin: DeviceId,
        kind: EventKind,
        payload: EventPayload,
    ) -> Self {
        let integrity_hash = Self::compute_integrity(&timestamp, &origin, &kind, &payload);
        let id = EventId::from_hash(integrity_hash);
        Self {
            id,
            timestamp,
            origin,
            kind,
            payload,
            integrity_hash,
        }
    }

    /// Verify the event's integrity hash matches its content.
    pub fn verify_integrity(&self) -> bool {
        let expected =
            Self::compute_integrity(&self.timestamp, &self.origin, &self.kind, &self.payload);
        self.integrity_hash == expected
    }

    /// Compute the BLAKE3 integrity hash over the event's core fields.
    fn compute_integrity(
        timestamp: &Timestamp,
        origin: &DeviceId,
        kind: &EventKind,
        payload: &EventPayload,
    ) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"habitfs-event-v1:");
        hasher.update(&timestamp.ms.to_le_bytes());
        hasher.update(origin.as_uuid().as_bytes());
        if let Ok(kind_bytes) = bincode::serialize(kind) {
            hasher.update(&kind_bytes);
        }
        if let Ok(payload_bytes) = bincode::serialize(payload) {
            hasher.update(&payload_bytes);
        }
        *hasher.finalize().as_bytes()
    }
}
