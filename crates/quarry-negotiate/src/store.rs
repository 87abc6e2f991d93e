//! Durable negotiation state.
//!
//! Two pieces of state survive a restart:
//!
//! - the [`NegotiationRecord`], rewritten whole on success;
//! - the attempt ledger, appended one [`AttemptEntry`] per trial so an
//!   interrupted run can resume.
//!
//! [`FileStore`] keeps them as JSON under a state directory.
//! [`MemoryStore`] keeps them in memory for tests and dry runs.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::{AttemptEntry, NegotiationRecord, StoreError};

const RECORD_FILE: &str = "negotiation.json";
const LEDGER_FILE: &str = "attempts.jsonl";

/// Storage for the record and the ledger.
pub trait NegotiationStore: Send + Sync {
    fn load_record(&self) -> Result<Option<NegotiationRecord>, StoreError>;

    /// Replaces any existing record.
    fn save_record(&self, record: &NegotiationRecord) -> Result<(), StoreError>;

    /// Removes the record. Not an error if there is none.
    fn delete_record(&self) -> Result<(), StoreError>;

    /// Entries in the order they were appended.
    fn load_ledger(&self) -> Result<Vec<AttemptEntry>, StoreError>;

    fn append_attempt(&self, entry: &AttemptEntry) -> Result<(), StoreError>;

    fn clear_ledger(&self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// JSON files under a state directory.
///
/// The record is written to a temp file and renamed into place, so a
/// crash leaves either the old record or the new one. The ledger is JSON
/// lines; a torn final line from a crash is ignored on read.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (and creates, if needed) the state directory.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// True if `file` is non-empty and its last byte is not a newline.
fn ends_mid_line(file: &mut fs::File) -> Result<bool, StoreError> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl NegotiationStore for FileStore {
    fn load_record(&self) -> Result<Option<NegotiationRecord>, StoreError> {
        let path = self.record_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loaded negotiation record");
        Ok(Some(record))
    }

    fn save_record(&self, record: &NegotiationRecord) -> Result<(), StoreError> {
        let path = self.record_path();
        let temp_path = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &path)?;

        tracing::debug!(
            version = record.protocol_version,
            path = %path.display(),
            "saved negotiation record"
        );
        Ok(())
    }

    fn delete_record(&self) -> Result<(), StoreError> {
        remove_if_exists(&self.record_path())
    }

    fn load_ledger(&self) -> Result<Vec<AttemptEntry>, StoreError> {
        let path = self.ledger_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = lineno + 1,
                        error = %e,
                        "ignoring unreadable ledger line"
                    );
                }
            }
        }
        Ok(entries)
    }

    fn append_attempt(&self, entry: &AttemptEntry) -> Result<(), StoreError> {
        let mut line =
            serde_json::to_string(entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
        line.push('\n');

        let path = self.ledger_path();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        if ends_mid_line(&mut file)? {
            tracing::warn!(path = %path.display(), "ledger ends mid-line, starting a new one");
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn clear_ledger(&self) -> Result<(), StoreError> {
        remove_if_exists(&self.ledger_path())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    record: Option<NegotiationRecord>,
    ledger: Vec<AttemptEntry>,
}

/// In-memory store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `record`.
    pub fn with_record(record: NegotiationRecord) -> Self {
        let store = Self::default();
        store.lock().record = Some(record);
        store
    }

    /// A store holding a partial ledger, as left by an interrupted run.
    pub fn with_ledger(ledger: Vec<AttemptEntry>) -> Self {
        let store = Self::default();
        store.lock().ledger = ledger;
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panic while holding this lock cannot leave the state half
        // written, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl NegotiationStore for MemoryStore {
    fn load_record(&self) -> Result<Option<NegotiationRecord>, StoreError> {
        Ok(self.lock().record.clone())
    }

    fn save_record(&self, record: &NegotiationRecord) -> Result<(), StoreError> {
        self.lock().record = Some(record.clone());
        Ok(())
    }

    fn delete_record(&self) -> Result<(), StoreError> {
        self.lock().record = None;
        Ok(())
    }

    fn load_ledger(&self) -> Result<Vec<AttemptEntry>, StoreError> {
        Ok(self.lock().ledger.clone())
    }

    fn append_attempt(&self, entry: &AttemptEntry) -> Result<(), StoreError> {
        self.lock().ledger.push(*entry);
        Ok(())
    }

    fn clear_ledger(&self) -> Result<(), StoreError> {
        self.lock().ledger.clear();
        Ok(())
    }
}

impl<S: NegotiationStore + ?Sized> NegotiationStore for std::sync::Arc<S> {
    fn load_record(&self) -> Result<Option<NegotiationRecord>, StoreError> {
        (**self).load_record()
    }

    fn save_record(&self, record: &NegotiationRecord) -> Result<(), StoreError> {
        (**self).save_record(record)
    }

    fn delete_record(&self) -> Result<(), StoreError> {
        (**self).delete_record()
    }

    fn load_ledger(&self) -> Result<Vec<AttemptEntry>, StoreError> {
        (**self).load_ledger()
    }

    fn append_attempt(&self, entry: &AttemptEntry) -> Result<(), StoreError> {
        (**self).append_attempt(entry)
    }

    fn clear_ledger(&self) -> Result<(), StoreError> {
        (**self).clear_ledger()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrialOutcome;

    fn entry(candidate: i32, outcome: TrialOutcome) -> AttemptEntry {
        AttemptEntry { candidate, outcome }
    }

    #[test]
    fn test_file_store_missing_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state")).unwrap();
        assert!(store.load_record().unwrap().is_none());
        assert!(store.load_ledger().unwrap().is_empty());
        store.delete_record().unwrap();
        store.clear_ledger().unwrap();
    }

    #[test]
    fn test_file_store_record_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = NegotiationRecord {
            protocol_version: 770,
            discovered_at: 42,
            server: Some("localhost:25565".into()),
        };
        FileStore::new(dir.path()).unwrap().save_record(&record).unwrap();

        let reopened = FileStore::new(dir.path()).unwrap();
        assert_eq!(reopened.load_record().unwrap(), Some(record));
        assert!(!reopened.record_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_store_corrupt_record_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        fs::write(store.record_path(), b"{not json").unwrap();
        assert!(matches!(store.load_record(), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn test_file_store_ledger_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.append_attempt(&entry(770, TrialOutcome::IncompatibleClient)).unwrap();
        store.append_attempt(&entry(769, TrialOutcome::Unknown)).unwrap();

        assert_eq!(
            store.load_ledger().unwrap(),
            vec![
                entry(770, TrialOutcome::IncompatibleClient),
                entry(769, TrialOutcome::Unknown)
            ]
        );

        store.clear_ledger().unwrap();
        assert!(store.load_ledger().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_ledger_ignores_torn_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.append_attempt(&entry(767, TrialOutcome::ConnectionError)).unwrap();
        let mut file = OpenOptions::new().append(true).open(store.ledger_path()).unwrap();
        file.write_all(br#"{"candidate":768,"outc"#).unwrap();

        assert_eq!(
            store.load_ledger().unwrap(),
            vec![entry(767, TrialOutcome::ConnectionError)]
        );
    }

    #[test]
    fn test_file_store_append_after_torn_line_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.append_attempt(&entry(767, TrialOutcome::ConnectionError)).unwrap();
        let mut file = OpenOptions::new().append(true).open(store.ledger_path()).unwrap();
        file.write_all(br#"{"candidate":768,"outc"#).unwrap();
        drop(file);

        store.append_attempt(&entry(769, TrialOutcome::IncompatibleClient)).unwrap();

        assert_eq!(
            store.load_ledger().unwrap(),
            vec![
                entry(767, TrialOutcome::ConnectionError),
                entry(769, TrialOutcome::IncompatibleClient),
            ]
        );
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store.save_record(&NegotiationRecord::new(767, None)).unwrap();
        store.append_attempt(&entry(767, TrialOutcome::Success)).unwrap();
        assert_eq!(store.load_record().unwrap().map(|r| r.protocol_version), Some(767));
        assert_eq!(store.load_ledger().unwrap().len(), 1);
        store.delete_record().unwrap();
        assert!(store.load_record().unwrap().is_none());
    }
}
