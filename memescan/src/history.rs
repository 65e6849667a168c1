//! Durable scan history.
//!
//! History is a single JSON array stored under [`HISTORY_KEY`], most recent
//! first and capped at [`MAX_HISTORY_ENTRIES`]. The backing [`Storage`] is a
//! plain string key-value store so the same history can live in a data
//! directory ([`FileStorage`]) or in memory ([`MemoryStorage`]).
//!
//! Writes replace the whole array; concurrent writers from separate processes
//! resolve last-write-wins.

use std::io;
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::proto::HistoryEntry;

/// Storage key holding the serialized history.
pub const HISTORY_KEY: &str = "scanHistory";

/// Entries retained; older ones are evicted first.
pub const MAX_HISTORY_ENTRIES: usize = 50;

/// Errors from the history store and its storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
    /// History could not be encoded.
    #[error("failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
    /// The key cannot be used as a file name.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// A synchronous string key-value store.
pub trait Storage: Send + Sync {
    /// Reads a value; `None` if the key was never written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Uses `dir`, creating it on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)?) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;
        // Write-then-rename so readers never see a torn file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: DashMap<String, String>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

impl<S: Storage> Storage for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
}

/// Capped, most-recent-first log of completed scans.
#[derive(Debug, Clone)]
pub struct ScanHistoryStore<S> {
    storage: S,
}

impl<S: Storage> ScanHistoryStore<S> {
    /// Wraps a storage backend.
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    /// The backing storage.
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// All entries, most recent first.
    ///
    /// Missing, unreadable or corrupt history reads as empty.
    #[must_use]
    pub fn load_all(&self) -> Vec<HistoryEntry> {
        let raw = match self.storage.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log_discarded("Failed to read scan history", &e);
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            log_discarded("Discarding unparsable scan history", &e);
            Vec::new()
        })
    }

    /// Prepends `entry`, evicts beyond the cap, and persists before returning.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the history cannot be encoded or written.
    pub fn append(&self, entry: HistoryEntry) -> Result<(), StorageError> {
        let mut entries = self.load_all();
        entries.insert(0, entry);
        entries.truncate(MAX_HISTORY_ENTRIES);
        let encoded = serde_json::to_string(&entries)?;
        self.storage.set(HISTORY_KEY, &encoded)
    }

    /// Finds the entry recorded for a purchase transaction.
    #[must_use]
    pub fn find_by_transaction(
        &self,
        transaction_hash: &alloy_primitives::TxHash,
    ) -> Option<HistoryEntry> {
        self.load_all()
            .into_iter()
            .find(|e| &e.transaction_hash == transaction_hash)
    }
}

#[cfg(feature = "telemetry")]
fn log_discarded(message: &str, err: &dyn std::error::Error) {
    tracing::warn!(error = %err, "{message}");
}

#[cfg(not(feature = "telemetry"))]
fn log_discarded(_message: &str, _err: &dyn std::error::Error) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{PurchaseReceipt, ScanTier};
    use crate::testing::sample_report;
    use crate::timestamp::UnixTimestamp;
    use alloy_primitives::{Address, B256};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn entry(n: u64) -> HistoryEntry {
        let receipt = PurchaseReceipt {
            transaction_hash: B256::left_padding_from(&n.to_be_bytes()),
            buyer: Address::repeat_byte(0xb0),
            token_address: Address::repeat_byte(0xa0),
            chain_id: 137,
            tier: ScanTier::Basic,
        };
        HistoryEntry::at(&receipt, sample_report(), UnixTimestamp::from_millis(n))
    }

    fn temp_dir() -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        std::env::temp_dir().join(format!(
            "memescan-history-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ))
    }

    #[test]
    fn empty_store_loads_nothing() {
        let store = ScanHistoryStore::new(MemoryStorage::new());
        assert!(store.load_all().is_empty());
    }

    #[test]
    fn append_prepends() {
        let store = ScanHistoryStore::new(MemoryStorage::new());
        store.append(entry(1)).unwrap();
        store.append(entry(2)).unwrap();
        let ids: Vec<_> = store.load_all().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn cap_evicts_oldest() {
        let store = ScanHistoryStore::new(MemoryStorage::new());
        for n in 1..=51 {
            store.append(entry(n)).unwrap();
        }
        let entries = store.load_all();
        assert_eq!(entries.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(entries[0].id, 51);
        assert!(entries.iter().all(|e| e.id != 1));
    }

    #[test]
    fn corrupt_history_reads_as_empty() {
        let storage = MemoryStorage::new();
        storage.set(HISTORY_KEY, "{not json").unwrap();
        let store = ScanHistoryStore::new(storage);
        assert!(store.load_all().is_empty());
        store.append(entry(7)).unwrap();
        assert_eq!(store.load_all().len(), 1);
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let dir = temp_dir();
        ScanHistoryStore::new(FileStorage::new(&dir))
            .append(entry(3))
            .unwrap();
        let reopened = ScanHistoryStore::new(FileStorage::new(&dir));
        let entries = reopened.load_all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, 3);
        assert!(reopened.find_by_transaction(&entries[0].transaction_hash).is_some());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn file_storage_rejects_path_like_keys() {
        let storage = FileStorage::new(temp_dir());
        assert!(matches!(
            storage.get("../etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
