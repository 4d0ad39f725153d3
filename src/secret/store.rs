//! Secret persistence port.
//!
//! The lifecycle manager keeps its own in-memory registry and writes through
//! to a [`SecretStore`]. Stores are keyed by the secret value, which is
//! unique; every operation is a point query on that key.
//!
//! Several managers (one per CLI invocation, say) may share a store, so the
//! redemption write is a compare-and-set on the stored record rather than a
//! blind overwrite.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use super::{Redeemer, SecretRecord, SecretState};

/// Schema version for the secret store document
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "hidemenot/secrets@1";

/// Errors from secret store operations
#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("secret already exists: {0}")]
    Duplicate(String),

    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret already redeemed: {0}")]
    AlreadyRedeemed(String),

    #[error("secret expired: {0}")]
    Expired(String),

    #[error("unsupported schema: {0}")]
    UnsupportedSchema(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for secret records.
pub trait SecretStore: Send + Sync {
    /// Insert a new record; fails with `Duplicate` if the value exists.
    fn insert(&self, record: &SecretRecord) -> Result<(), SecretStoreError>;

    /// Flip the stored record ACTIVE → REDEEMED and return it.
    ///
    /// Fails with `NotFound` if absent, `AlreadyRedeemed` if the stored
    /// record already carries a redeemer, and `Expired` if `at` is past its
    /// deadline. A failed call leaves the record untouched.
    fn mark_redeemed(
        &self,
        value: &str,
        by: &Redeemer,
        at: DateTime<Utc>,
    ) -> Result<SecretRecord, SecretStoreError>;

    /// Delete by value. Returns whether a record was removed.
    fn remove(&self, value: &str) -> Result<bool, SecretStoreError>;

    fn get(&self, value: &str) -> Result<Option<SecretRecord>, SecretStoreError>;

    fn load_all(&self) -> Result<Vec<SecretRecord>, SecretStoreError>;
}

/// Compare-and-set on one stored record
fn redeem_stored(
    value: &str,
    record: Option<&mut SecretRecord>,
    by: &Redeemer,
    at: DateTime<Utc>,
) -> Result<SecretRecord, SecretStoreError> {
    let record = record.ok_or_else(|| SecretStoreError::NotFound(value.to_string()))?;
    match record.state_at(at) {
        SecretState::Redeemed => Err(SecretStoreError::AlreadyRedeemed(value.to_string())),
        SecretState::Expired => Err(SecretStoreError::Expired(value.to_string())),
        SecretState::Active => {
            record.redeemed_by = Some(by.clone());
            record.redeemed_at = Some(at);
            Ok(record.clone())
        }
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    records: RwLock<BTreeMap<String, SecretRecord>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn insert(&self, record: &SecretRecord) -> Result<(), SecretStoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&record.value) {
            return Err(SecretStoreError::Duplicate(record.value.clone()));
        }
        records.insert(record.value.clone(), record.clone());
        Ok(())
    }

    fn mark_redeemed(
        &self,
        value: &str,
        by: &Redeemer,
        at: DateTime<Utc>,
    ) -> Result<SecretRecord, SecretStoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        redeem_stored(value, records.get_mut(value), by, at)
    }

    fn remove(&self, value: &str) -> Result<bool, SecretStoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Ok(records.remove(value).is_some())
    }

    fn get(&self, value: &str) -> Result<Option<SecretRecord>, SecretStoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(value).cloned())
    }

    fn load_all(&self) -> Result<Vec<SecretRecord>, SecretStoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.values().cloned().collect())
    }
}

/// On-disk document: records indexed by value
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SecretDocument {
    schema_version: u32,
    schema_id: String,
    secrets: BTreeMap<String, SecretRecord>,
}

impl Default for SecretDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            secrets: BTreeMap::new(),
        }
    }
}

/// Single-file JSON store.
///
/// Each mutation is read-modify-write of the whole document, committed with
/// write-then-rename. Threads serialize on a mutex; processes serialize on
/// an advisory lock over a `.lock` file next to the document.
#[derive(Debug)]
pub struct JsonSecretStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock: Mutex<()>,
}

impl JsonSecretStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SecretStoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            lock_path: path.with_extension("lock"),
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Advisory lock over the document, released when the file drops.
    fn file_lock(&self, exclusive: bool) -> Result<File, SecretStoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        if exclusive {
            FileExt::lock_exclusive(&file)?;
        } else {
            FileExt::lock_shared(&file)?;
        }
        Ok(file)
    }

    fn read_document(&self) -> Result<SecretDocument, SecretStoreError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SecretDocument::default()),
            Err(e) => return Err(e.into()),
        };
        let doc: SecretDocument = serde_json::from_str(&json)?;
        if doc.schema_version != SCHEMA_VERSION || doc.schema_id != SCHEMA_ID {
            return Err(SecretStoreError::UnsupportedSchema(format!(
                "{} v{}",
                doc.schema_id, doc.schema_version
            )));
        }
        Ok(doc)
    }

    /// Write atomically (write-then-rename)
    fn write_document(&self, doc: &SecretDocument) -> Result<(), SecretStoreError> {
        let json = serde_json::to_string_pretty(doc)?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut SecretDocument) -> Result<T, SecretStoreError>,
    ) -> Result<T, SecretStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _file = self.file_lock(true)?;
        let mut doc = self.read_document()?;
        let out = f(&mut doc)?;
        self.write_document(&doc)?;
        Ok(out)
    }
}

impl SecretStore for JsonSecretStore {
    fn insert(&self, record: &SecretRecord) -> Result<(), SecretStoreError> {
        self.mutate(|doc| {
            if doc.secrets.contains_key(&record.value) {
                return Err(SecretStoreError::Duplicate(record.value.clone()));
            }
            doc.secrets.insert(record.value.clone(), record.clone());
            Ok(())
        })
    }

    fn mark_redeemed(
        &self,
        value: &str,
        by: &Redeemer,
        at: DateTime<Utc>,
    ) -> Result<SecretRecord, SecretStoreError> {
        self.mutate(|doc| redeem_stored(value, doc.secrets.get_mut(value), by, at))
    }

    fn remove(&self, value: &str) -> Result<bool, SecretStoreError> {
        self.mutate(|doc| Ok(doc.secrets.remove(value).is_some()))
    }

    fn get(&self, value: &str) -> Result<Option<SecretRecord>, SecretStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _file = self.file_lock(false)?;
        Ok(self.read_document()?.secrets.get(value).cloned())
    }

    fn load_all(&self) -> Result<Vec<SecretRecord>, SecretStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _file = self.file_lock(false)?;
        Ok(self.read_document()?.secrets.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::Redeemer;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn record(value: &str) -> SecretRecord {
        SecretRecord::new(value.to_string(), t0(), Duration::seconds(120))
    }

    fn exercise(store: &dyn SecretStore) {
        store.insert(&record("CTF{a}")).unwrap();
        assert!(matches!(
            store.insert(&record("CTF{a}")),
            Err(SecretStoreError::Duplicate(_))
        ));

        let redeemed = store
            .mark_redeemed("CTF{a}", &Redeemer::new("alice"), t0())
            .unwrap();
        assert_eq!(redeemed.redeemed_by, Some(Redeemer::new("alice")));
        assert_eq!(store.get("CTF{a}").unwrap(), Some(redeemed.clone()));

        // The stored winner is never overwritten.
        assert!(matches!(
            store.mark_redeemed("CTF{a}", &Redeemer::new("bob"), t0()),
            Err(SecretStoreError::AlreadyRedeemed(_))
        ));
        assert_eq!(store.get("CTF{a}").unwrap(), Some(redeemed));

        assert!(matches!(
            store.mark_redeemed("CTF{missing}", &Redeemer::new("alice"), t0()),
            Err(SecretStoreError::NotFound(_))
        ));

        store.insert(&record("CTF{b}")).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 2);

        assert!(store.remove("CTF{a}").unwrap());
        assert!(!store.remove("CTF{a}").unwrap());
        assert_eq!(store.get("CTF{a}").unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemorySecretStore::new());
    }

    #[test]
    fn test_json_store() {
        let dir = TempDir::new().unwrap();
        let store = JsonSecretStore::open(dir.path().join("db/secrets.json")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_mark_redeemed_refuses_past_deadline() {
        let store = MemorySecretStore::new();
        store.insert(&record("CTF{late}")).unwrap();
        assert!(matches!(
            store.mark_redeemed("CTF{late}", &Redeemer::new("alice"), t0() + Duration::seconds(121)),
            Err(SecretStoreError::Expired(_))
        ));
        assert!(store.get("CTF{late}").unwrap().unwrap().redeemed_by.is_none());
    }

    #[test]
    fn test_json_handles_on_one_file_have_one_winner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secrets.json");
        JsonSecretStore::open(&path)
            .unwrap()
            .insert(&record("CTF{shared}"))
            .unwrap();

        const HANDLES: usize = 8;
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(HANDLES));
        let threads: Vec<_> = (0..HANDLES)
            .map(|i| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    // Separate handles: only the file lock serializes them.
                    let store = JsonSecretStore::open(&path).unwrap();
                    barrier.wait();
                    store
                        .mark_redeemed("CTF{shared}", &Redeemer::new(format!("user-{}", i)), t0())
                        .map(|r| r.redeemed_by)
                })
            })
            .collect();
        let results: Vec<_> = threads
            .into_iter()
            .map(|t| t.join().expect("Thread panicked"))
            .collect();

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(SecretStoreError::AlreadyRedeemed(_)))));

        let stored = JsonSecretStore::open(&path).unwrap().get("CTF{shared}").unwrap().unwrap();
        assert_eq!(&stored.redeemed_by, winners[0]);
    }

    #[test]
    fn test_json_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secrets.json");
        JsonSecretStore::open(&path)
            .unwrap()
            .insert(&record("CTF{persist}"))
            .unwrap();

        let reopened = JsonSecretStore::open(&path).unwrap();
        let all = reopened.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, "CTF{persist}");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonSecretStore::open(dir.path().join("secrets.json")).unwrap();
        assert!(store.load_all().unwrap().is_empty());
        assert_eq!(store.get("CTF{x}").unwrap(), None);
    }

    #[test]
    fn test_json_store_rejects_foreign_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secrets.json");
        fs::write(
            &path,
            r#"{"schema_version":9,"schema_id":"other@9","secrets":{}}"#,
        )
        .unwrap();
        let store = JsonSecretStore::open(&path).unwrap();
        assert!(matches!(
            store.load_all(),
            Err(SecretStoreError::UnsupportedSchema(_))
        ));
    }
}
