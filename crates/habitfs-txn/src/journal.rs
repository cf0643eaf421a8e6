use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{TxnError, TxnResult};
use crate::record::TransactionRecord;

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, Default)]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// Rely on OS page-cache buffering (fastest, least durable).
    #[default]
    OsDefault,
}

/// Configuration for the transaction journal.
#[derive(Clone, Debug, Default)]
pub struct JournalConfig {
    /// Sync/flush strategy.
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Internal mutable state for the journal writer.
struct JournalWriter {
    writer: BufWriter<File>,
    /// Current write offset in the file.
    offset: u64,
}

/// Append-only transaction journal with CRC framing.
///
/// On-disk format per entry:
/// ```text
/// [4 bytes: entry length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized TransactionRecord)]
/// ```
///
/// Records are appended on `begin` and again on `complete`; the last
/// record per transaction id wins on recovery. Entries that fail the CRC
/// check are skipped — they represent torn writes from a crash.
pub struct Journal {
    /// Path to the journal file.
    path: PathBuf,
    /// Writer state behind a mutex for thread safety.
    writer: Mutex<JournalWriter>,
    /// Configuration.
    config: JournalConfig,
}

impl Journal {
    /// Open (or create) a journal file at the given path.
    pub fn open(path: &Path, config: JournalConfig) -> TxnResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let offset = file.metadata()?.len();
        let writer = BufWriter::new(file);

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter { writer, offset }),
            config,
        })
    }

    /// Append a record to the journal. Returns the byte offset of the entry.
    pub fn append(&self, record: &TransactionRecord) -> TxnResult<u64> {
        let payload =
            bincode::serialize(record).map_err(|e| TxnError::Serialization(e.to_string()))?;

        let length = payload.len() as u32;
        let crc = crc32fast::hash(&payload);

        let mut w = self.writer.lock().expect("journal mutex poisoned");
        let entry_offset = w.offset;

        // Write header: [length: u32 LE] [crc: u32 LE]
        w.writer.write_all(&length.to_le_bytes())?;
        w.writer.write_all(&crc.to_le_bytes())?;
        w.writer.write_all(&payload)?;

        if matches!(self.config.sync_mode, SyncMode::EveryWrite) {
            w.writer.flush()?;
            w.writer.get_ref().sync_all()?;
        } else {
            w.writer.flush()?;
        }

        w.offset += HEADER_SIZE as u64 + payload.len() as u64;

        debug!(offset = entry_offset, len = payload.len(), "journal append");
        Ok(entry_offset)
    }

    /// Recover all valid records from the journal, oldest first.
    ///
    /// Reads the file front-to-back. Entries that fail CRC validation are
    /// logged and skipped (torn writes from a crash).
    pub fn recover(&self) -> TxnResult<Vec<TransactionRecord>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header_buf = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let length =
                u32::from_le_bytes([header_buf[0], header_buf[1], header_buf[2], header_buf[3]]);
            let expected_crc =
                u32::from_le_bytes([header_buf[4], header_buf[5], header_buf[6], header_buf[7]]);

            if length == 0 || (offset + HEADER_SIZE as u64 + length as u64) > file_len {
                warn!(
                    offset,
                    length, file_len, "invalid journal entry length; stopping recovery"
                );
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match file.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated journal entry; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping entry"
                );
                offset += HEADER_SIZE as u64 + length as u64;
                continue;
            }

            match bincode::deserialize::<TransactionRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(offset, error = %e, "failed to deserialize journal entry; skipping");
                }
            }

            offset += HEADER_SIZE as u64 + length as u64;
        }

        debug!(recovered = records.len(), "journal recovery complete");
        Ok(records)
    }

    /// Truncate the journal (remove all data).
    ///
    /// Safe once every recorded transaction has completed and been acted
    /// on; the in-memory log remains authoritative for the session.
    pub fn truncate(&self) -> TxnResult<()> {
        let mut w = self.writer.lock().expect("journal mutex poisoned");

        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;

        w.writer = BufWriter::new(file);
        w.offset = 0;

        debug!("journal truncated");
        Ok(())
    }

    /// Current write offset.
    pub fn offset(&self) -> u64 {
        self.writer.lock().expect("journal mutex poisoned").offset
    }

    /// Path to the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{OpKind, TransactionRecord, TxnStatus};
    use habitfs_types::{DeviceId, Digest, Timestamp};

    fn make_record(tag: u8) -> TransactionRecord {
        TransactionRecord::begin(
            DeviceId::new(),
            OpKind::CowCopy,
            vec![Digest::from_hash([tag; 32])],
        )
    }

    #[test]
    fn append_and_recover_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txn.journal");
        let journal = Journal::open(&path, JournalConfig::default()).unwrap();

        let r1 = make_record(1);
        let r2 = make_record(2);
        journal.append(&r1).unwrap();
        journal.append(&r2).unwrap();

        let recovered = journal.recover().unwrap();
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[0], r1);
        assert_eq!(recovered[1], r2);
    }

    #[test]
    fn recover_empty_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.journal");
        let journal = Journal::open(&path, JournalConfig::default()).unwrap();
        assert!(journal.recover().unwrap().is_empty());
    }

    #[test]
    fn completion_record_appends_after_begin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lifecycle.journal");
        let journal = Journal::open(&path, JournalConfig::default()).unwrap();

        let mut record = make_record(1);
        journal.append(&record).unwrap();
        record.status = TxnStatus::Committed;
        record.completed_at = Some(Timestamp::now());
        journal.append(&record).unwrap();

        let recovered = journal.recover().unwrap();
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[0].status, TxnStatus::Pending);
        assert_eq!(recovered[1].status, TxnStatus::Committed);
        assert_eq!(recovered[0].id, recovered[1].id);
    }

    #[test]
    fn crc_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.journal");
        let journal = Journal::open(&path, JournalConfig::default()).unwrap();

        let r1 = make_record(1);
        let r2 = make_record(2);
        journal.append(&r1).unwrap();
        journal.append(&r2).unwrap();
        drop(journal);

        // Flip a byte in the first entry's payload.
        {
            let mut file = OpenOptions::new()
                .write(true)
                .read(true)
                .open(&path)
                .unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            file.write_all(&buf).unwrap();
            file.sync_all().unwrap();
        }

        let journal = Journal::open(&path, JournalConfig::default()).unwrap();
        let recovered = journal.recover().unwrap();

        // First entry skipped on CRC failure; second survives.
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0], r2);
    }

    #[test]
    fn recovery_survives_truncated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.journal");
        let journal = Journal::open(&path, JournalConfig::default()).unwrap();

        let r1 = make_record(1);
        journal.append(&r1).unwrap();
        journal.append(&make_record(2)).unwrap();
        let total_len = journal.offset();
        drop(journal);

        // Chop the file mid-entry.
        {
            let file = OpenOptions::new().write(true).open(&path).unwrap();
            file.set_len(total_len - 4).unwrap();
        }

        let journal = Journal::open(&path, JournalConfig::default()).unwrap();
        let recovered = journal.recover().unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0], r1);
    }

    #[test]
    fn truncate_clears_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trunc.journal");
        let journal = Journal::open(&path, JournalConfig::default()).unwrap();

        journal.append(&make_record(1)).unwrap();
        assert!(journal.offset() > 0);

        journal.truncate().unwrap();
        assert_eq!(journal.offset(), 0);
        assert!(journal.recover().unwrap().is_empty());
    }

    #[test]
    fn append_returns_increasing_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offsets.journal");
        let journal = Journal::open(&path, JournalConfig::default()).unwrap();

        let off1 = journal.append(&make_record(1)).unwrap();
        let off2 = journal.append(&make_record(2)).unwrap();
        assert_eq!(off1, 0);
        assert!(off2 > off1);
    }

    #[test]
    fn sync_every_write_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.journal");
        let config = JournalConfig {
            sync_mode: SyncMode::EveryWrite,
        };
        let journal = Journal::open(&path, config).unwrap();

        journal.append(&make_record(1)).unwrap();
        assert_eq!(journal.recover().unwrap().len(), 1);
    }
}
