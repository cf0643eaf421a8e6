use std::collections::HashMap;
use std::sync::RwLock;

use habitfs_types::{DeviceId, Digest, Timestamp};
use tracing::{debug, info};

use crate::error::{TxnError, TxnResult};
use crate::journal::Journal;
use crate::record::{OpKind, TransactionRecord, TxnId, TxnStatus};

/// In-memory transaction registry with optional durable journaling.
///
/// `begin` records intent (Pending); `complete` records the outcome.
/// Records are never removed during a session — they are the audit trail.
/// With a journal attached, every state change is also appended to disk,
/// and [`TransactionLog::recover`] reconstructs the registry after a
/// crash (last record per id wins).
pub struct TransactionLog {
    records: RwLock<HashMap<TxnId, TransactionRecord>>,
    journal: Option<Journal>,
}

impl TransactionLog {
    /// Create a log without durable journaling.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            journal: None,
        }
    }

    /// Create a log that appends every record to the given journal.
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            journal: Some(journal),
        }
    }

    /// Rebuild a log from a journal after a crash.
    ///
    /// Replays records oldest-first; the last record per transaction id
    /// wins, so completed transactions land Committed/RolledBack and
    /// interrupted ones stay Pending.
    pub fn recover(journal: Journal) -> TxnResult<Self> {
        let replayed = journal.recover()?;
        let mut records: HashMap<TxnId, TransactionRecord> = HashMap::new();
        for record in replayed {
            records.insert(record.id, record);
        }
        let pending = records.values().filter(|r| r.is_pending()).count();
        info!(
            recovered = records.len(),
            pending, "transaction log recovered"
        );
        Ok(Self {
            records: RwLock::new(records),
            journal: Some(journal),
        })
    }

    /// Begin a transaction, returning its id.
    pub fn begin(
        &self,
        owner: DeviceId,
        op: OpKind,
        affected: Vec<Digest>,
    ) -> TxnResult<TxnId> {
        let record = TransactionRecord::begin(owner, op, affected);
        let id = record.id;
        if let Some(journal) = &self.journal {
            journal.append(&record)?;
        }
        self.records
            .write()
            .expect("lock poisoned")
            .insert(id, record);
        debug!(%id, %op, "transaction begun");
        Ok(id)
    }

    /// Complete a transaction as Committed or RolledBack.
    ///
    /// Only a Pending transaction can complete, and only to a terminal
    /// status; anything else is an `InvalidTransition`.
    pub fn complete(&self, id: TxnId, status: TxnStatus) -> TxnResult<()> {
        if status == TxnStatus::Pending {
            let from = self.get(id).map(|r| r.status).unwrap_or(TxnStatus::Pending);
            return Err(TxnError::InvalidTransition {
                id,
                from,
                to: status,
            });
        }

        let mut records = self.records.write().expect("lock poisoned");
        let record = records.get_mut(&id).ok_or(TxnError::NotFound(id))?;
        if record.status != TxnStatus::Pending {
            return Err(TxnError::InvalidTransition {
                id,
                from: record.status,
                to: status,
            });
        }

        record.status = status;
        record.completed_at = Some(Timestamp::now());
        let completed = record.clone();
        drop(records);

        if let Some(journal) = &self.journal {
            journal.append(&completed)?;
        }
        debug!(%id, ?status, "transaction completed");
        Ok(())
    }

    /// Fetch a transaction record by id.
    pub fn get(&self, id: TxnId) -> Option<TransactionRecord> {
        self.records
            .read()
            .expect("lock poisoned")
            .get(&id)
            .cloned()
    }

    /// Transactions that began but never completed, oldest first.
    ///
    /// After recovery these are the crash casualties an operator (or the
    /// facade) must reconcile.
    pub fn pending(&self) -> Vec<TransactionRecord> {
        let records = self.records.read().expect("lock poisoned");
        let mut pending: Vec<TransactionRecord> = records
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.started_at);
        pending
    }

    /// Number of records in the log.
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().expect("lock poisoned").is_empty()
    }
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLog")
            .field("records", &self.len())
            .field("journaled", &self.journal.is_some())
            .finish()
    }
}
