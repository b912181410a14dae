//! Durable state store.
//!
//! Each component keeps its authoritative collection in a sled tree and
//! writes through on every transition. Values are JSON-encoded records.

use std::path::Path;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};

use crate::error::Error;

/// Tree name for migration records.
pub const MIGRATIONS_TREE: &str = "ops:migrations";

/// Tree name for the append-only migration history.
pub const HISTORY_TREE: &str = "ops:migration_history";

/// Tree name for backup records.
pub const BACKUPS_TREE: &str = "ops:backups";

/// Tree name for alerts.
pub const ALERTS_TREE: &str = "ops:alerts";

/// Tree name for health trend points.
pub const TRENDS_TREE: &str = "ops:trends";

/// Handle to one persisted collection.
#[derive(Clone)]
pub struct Collection {
    db: Db,
    tree: Tree,
    #[cfg(test)]
    reject_writes: Arc<AtomicBool>,
}

impl Collection {
    /// Make every later write through this handle and its clones fail.
    #[cfg(test)]
    pub(crate) fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn check_writable(&self) -> Result<(), Error> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(sled::Error::Unsupported("writes rejected".to_string()).into());
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_writable(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Insert or replace a record.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), Error> {
        self.check_writable()?;
        let bytes = serde_json::to_vec(value)?;
        self.tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Load a record.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove a record, returning whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool, Error> {
        Ok(self.tree.remove(key.as_bytes())?.is_some())
    }

    /// Load every record in key order.
    pub fn load_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        let mut records = Vec::new();
        for entry in self.tree.iter() {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// Append a record under a monotonically increasing sequence key.
    pub fn append<T: Serialize>(&self, value: &T) -> Result<u64, Error> {
        self.check_writable()?;
        let seq = self.db.generate_id()?;
        let bytes = serde_json::to_vec(value)?;
        self.tree.insert(seq.to_be_bytes(), bytes)?;
        Ok(seq)
    }

    /// Drop the oldest records until at most `keep` remain.
    pub fn truncate_front(&self, keep: usize) -> Result<usize, Error> {
        let excess = self.tree.len().saturating_sub(keep);
        let mut removed = 0;
        for _ in 0..excess {
            if self.tree.pop_min()?.is_none() {
                break;
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

/// The control plane's persistence boundary.
#[derive(Clone)]
pub struct StateStore {
    db: Db,
}

impl StateStore {
    /// Open or create a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open a store that is discarded on drop.
    pub fn temporary() -> Result<Self, Error> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Open a named collection.
    pub fn collection(&self, name: &str) -> Result<Collection, Error> {
        Ok(Collection {
            db: self.db.clone(),
            tree: self.db.open_tree(name)?,
            #[cfg(test)]
            reject_writes: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: String,
        value: u32,
    }

    #[test]
    fn test_put_get_remove() {
        let store = StateStore::temporary().unwrap();
        let records = store.collection("test").unwrap();

        let record = Record {
            id: "a".to_string(),
            value: 1,
        };
        records.put(&record.id, &record).unwrap();
        assert_eq!(records.get::<Record>("a").unwrap(), Some(record));

        assert!(records.remove("a").unwrap());
        assert!(!records.remove("a").unwrap());
        assert!(records.get::<Record>("a").unwrap().is_none());
    }

    #[test]
    fn test_append_and_truncate() {
        let store = StateStore::temporary().unwrap();
        let log = store.collection("log").unwrap();

        for value in 0..5 {
            log.append(&Record {
                id: format!("r{}", value),
                value,
            })
            .unwrap();
        }
        assert_eq!(log.len(), 5);

        assert_eq!(log.truncate_front(3).unwrap(), 2);
        let remaining: Vec<Record> = log.load_all().unwrap();
        let values: Vec<u32> = remaining.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2, 3, 4]);
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = StateStore::open(dir.path()).unwrap();
            let records = store.collection("test").unwrap();
            records
                .put(
                    "k",
                    &Record {
                        id: "k".to_string(),
                        value: 9,
                    },
                )
                .unwrap();
            store.flush().unwrap();
        }

        let store = StateStore::open(dir.path()).unwrap();
        let records = store.collection("test").unwrap();
        let loaded: Vec<Record> = records.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].value, 9);
    }
}
