//! Transaction log for habitfs mutations.
//!
//! Every copy commit is wrapped in a [`TransactionRecord`]: `begin` writes
//! a Pending record, the copy runs, and `complete` marks it Committed or
//! RolledBack (with compensating reference-count decrements performed by
//! the caller). The log exists for auditability and crash recovery, not
//! for hot-path correctness of a single in-memory transaction.
//!
//! The optional [`Journal`] persists every record append-only with
//! length+CRC32 framing; recovery reads front-to-back, skips torn writes,
//! and surfaces transactions that never completed.

pub mod error;
pub mod journal;
pub mod log;
pub mod record;

pub use error::{TxnError, TxnResult};
pub use journal::{Journal, JournalConfig, SyncMode};
pub use log::TransactionLog;
pub use record::{OpKind, TransactionRecord, TxnId, TxnStatus};
