use std::fmt;

use habitfs_types::{DeviceId, Digest, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique transaction identifier (UUIDv7, time-ordered).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(Uuid);

impl TxnId {
    /// Generate a fresh transaction id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxnId({})", self.0)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// The kind of mutating operation a transaction wraps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// A copy-on-write copy into a container.
    CowCopy,
    /// A direct reference update.
    RefUpdate,
    /// A garbage collection cycle.
    Gc,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CowCopy => "cow-copy",
            Self::RefUpdate => "ref-update",
            Self::Gc => "gc",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnStatus {
    /// Begun, outcome not yet recorded.
    Pending,
    /// Completed successfully.
    Committed,
    /// Failed; compensating decrements were applied by the caller.
    RolledBack,
}

/// Audit record of one mutating operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique transaction id.
    pub id: TxnId,
    /// Device that issued the operation.
    pub owner: DeviceId,
    /// What kind of operation this wraps.
    pub op: OpKind,
    /// Digests the operation touches.
    pub affected: Vec<Digest>,
    /// When the transaction began.
    pub started_at: Timestamp,
    /// When the transaction completed, if it has.
    pub completed_at: Option<Timestamp>,
    /// Current lifecycle state.
    pub status: TxnStatus,
}

impl TransactionRecord {
    /// Begin a new Pending transaction.
    pub fn begin(owner: DeviceId, op: OpKind, affected: Vec<Digest>) -> Self {
        Self {
            id: TxnId::new(),
            owner,
            op,
            affected,
            started_at: Timestamp::now(),
            completed_at: None,
            status: TxnStatus::Pending,
        }
    }

    /// Returns `true` if the transaction has not completed.
    pub fn is_pending(&self) -> bool {
        self.status == TxnStatus::Pending
    }
}
