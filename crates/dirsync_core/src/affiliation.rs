//! The persisted recipe and watermark for one sync relationship.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// The recipe and mutable sync state for one source/destination pairing.
///
/// Connection and scope fields are immutable for the life of the record:
/// changing the scope invalidates the accumulated watermark, so a caller
/// wanting a different scope must create a fresh record (or call
/// [`clear_watermark`](Self::clear_watermark) and run a full sync).
///
/// `invocation_id` and `highest_committed_usn` are either both set or both
/// unset; the engine never persists partial watermark state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffiliationRecord {
    /// URL of the directory server (`ldap://` or `ldaps://`).
    pub url: String,
    /// DN to bind as; empty for anonymous binds.
    pub bind_user: String,
    /// Password for the bind DN.
    pub bind_password: String,
    /// Root DN of the directory tree (the naming context).
    pub root_dn: String,
    /// Subtree DN the sync is scoped to.
    pub sync_base_dn: String,
    /// Caller filter selecting the entries to replicate.
    pub search_filter: String,
    /// Caller filter selecting tombstoned entries in the deleted-objects
    /// container.
    pub search_deleted_objects_filter: String,
    /// Names of the attributes to retrieve, in delivery order.
    pub attributes_to_sync: Vec<String>,
    /// Identity token of the remote database instance as of the last full
    /// sync; `None` until one has succeeded.
    #[serde(default)]
    pub invocation_id: Option<Uuid>,
    /// Remote sequence counter recorded at the last successful sync;
    /// `None` until a full sync has succeeded.
    #[serde(default)]
    pub highest_committed_usn: Option<i64>,
}

impl AffiliationRecord {
    /// Returns true once a full sync has recorded both watermark fields.
    pub fn has_watermark(&self) -> bool {
        self.invocation_id.is_some() && self.highest_committed_usn.is_some()
    }

    /// Clears the watermark, forcing the next sync to be a full one.
    pub fn clear_watermark(&mut self) {
        self.invocation_id = None;
        self.highest_committed_usn = None;
    }
}

/// Load/save access to affiliation records.
///
/// Implementations persist by value: the engine holds a working copy for the
/// duration of a pass and hands it back at the end, so the store never
/// aliases the engine's copy.
pub trait AffiliationStore {
    /// Key type identifying one record.
    type Key;

    /// Loads the record stored under `key`.
    fn load(&self, key: &Self::Key) -> Result<AffiliationRecord, StoreError>;

    /// Persists `record` under `key`, returning the persisted value.
    fn save(&self, key: &Self::Key, record: &AffiliationRecord)
        -> Result<AffiliationRecord, StoreError>;
}

/// An in-memory affiliation store.
///
/// Cloning yields a handle onto the same records, so a test can keep a
/// handle while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryAffiliationStore {
    records: Arc<Mutex<HashMap<String, AffiliationRecord>>>,
}

impl MemoryAffiliationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record.
    pub fn insert(&self, key: impl Into<String>, record: AffiliationRecord) {
        self.records.lock().insert(key.into(), record);
    }

    /// Returns a copy of the record stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<AffiliationRecord> {
        self.records.lock().get(key).cloned()
    }
}

impl AffiliationStore for MemoryAffiliationStore {
    type Key = String;

    fn load(&self, key: &String) -> Result<AffiliationRecord, StoreError> {
        self.records
            .lock()
            .get(key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn save(
        &self,
        key: &String,
        record: &AffiliationRecord,
    ) -> Result<AffiliationRecord, StoreError> {
        self.records.lock().insert(key.clone(), record.clone());
        Ok(record.clone())
    }
}

/// A JSON-file-backed affiliation store, one file per record.
///
/// Writes go to a temporary file in the same directory followed by a rename,
/// so a crash mid-save never leaves a truncated record behind.
#[derive(Debug, Clone)]
pub struct FileAffiliationStore {
    directory: PathBuf,
}

impl FileAffiliationStore {
    /// Creates a store rooted at `directory` (created on first save).
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{key}.json"))
    }
}

impl AffiliationStore for FileAffiliationStore {
    type Key = String;

    fn load(&self, key: &String) -> Result<AffiliationRecord, StoreError> {
        let path = self.record_path(key);
        let data = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound
            } else {
                StoreError::Backend(e.to_string())
            }
        })?;
        serde_json::from_str(&data).map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn save(
        &self,
        key: &String,
        record: &AffiliationRecord,
    ) -> Result<AffiliationRecord, StoreError> {
        fs::create_dir_all(&self.directory).map_err(|e| StoreError::Backend(e.to_string()))?;
        let data = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let path = self.record_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|e| StoreError::Backend(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> AffiliationRecord {
        AffiliationRecord {
            url: "ldap://dc01.example.com:389".into(),
            bind_user: "CN=svc-sync,OU=Service,DC=example,DC=com".into(),
            bind_password: "hunter2".into(),
            root_dn: "DC=example,DC=com".into(),
            sync_base_dn: "OU=People,DC=example,DC=com".into(),
            search_filter: "(objectClass=user)".into(),
            search_deleted_objects_filter: "(isDeleted=TRUE)".into(),
            attributes_to_sync: vec!["sAMAccountName".into(), "mail".into()],
            invocation_id: None,
            highest_committed_usn: None,
        }
    }

    #[test]
    fn watermark_state() {
        let mut record = sample_record();
        assert!(!record.has_watermark());

        record.invocation_id = Some(Uuid::new_v4());
        assert!(!record.has_watermark());

        record.highest_committed_usn = Some(42);
        assert!(record.has_watermark());

        record.clear_watermark();
        assert!(!record.has_watermark());
    }

    #[test]
    fn memory_store_load_save() {
        let store = MemoryAffiliationStore::new();
        let key = "acme".to_string();

        assert!(matches!(store.load(&key), Err(StoreError::NotFound)));

        let mut record = sample_record();
        store.insert(key.clone(), record.clone());
        assert_eq!(store.load(&key).unwrap(), record);

        record.highest_committed_usn = Some(7);
        record.invocation_id = Some(Uuid::new_v4());
        let persisted = store.save(&key, &record).unwrap();
        assert_eq!(persisted, record);
        assert_eq!(store.get("acme"), Some(record));
    }

    #[test]
    fn memory_store_clone_shares_records() {
        let store = MemoryAffiliationStore::new();
        let handle = store.clone();
        store.insert("acme", sample_record());
        assert!(handle.get("acme").is_some());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAffiliationStore::new(dir.path());
        let key = "acme".to_string();

        assert!(matches!(store.load(&key), Err(StoreError::NotFound)));

        let mut record = sample_record();
        record.invocation_id = Some(Uuid::new_v4());
        record.highest_committed_usn = Some(12345);
        store.save(&key, &record).unwrap();

        assert_eq!(store.load(&key).unwrap(), record);
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAffiliationStore::new(dir.path());
        fs::write(dir.path().join("bad.json"), "not json").unwrap();

        assert!(matches!(
            store.load(&"bad".to_string()),
            Err(StoreError::Backend(_))
        ));
    }

    #[test]
    fn record_serde_round_trip() {
        let mut record = sample_record();
        record.invocation_id = Some(Uuid::new_v4());
        record.highest_committed_usn = Some(99);

        let json = serde_json::to_string(&record).unwrap();
        let back: AffiliationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
