use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::storage::models::FileRecord;
use crate::storage::{Database, Result, StorageError};

/// Durable hash → first-seen record store with a write-through
/// hash → present cache in front of it.
///
/// Negative lookups are cached too, so within one run a hash never hits
/// storage twice. The index is the only writer of its cache; a failed insert
/// leaves the cache as it was.
pub struct ExistenceIndex {
    db: Mutex<Database>,
    cache: RwLock<HashMap<String, bool>>,
    storage_lookups: AtomicU64,
}

impl ExistenceIndex {
    pub fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            cache: RwLock::new(HashMap::new()),
            storage_lookups: AtomicU64::new(0),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn exists(&self, hash: &str) -> Result<bool> {
        {
            let cache = self.cache.read().map_err(|_| StorageError::Poisoned)?;
            if let Some(&present) = cache.get(hash) {
                trace!("Cache hit for {}: {}", hash, present);
                return Ok(present);
            }
        }

        let present = {
            let db = self.db.lock().map_err(|_| StorageError::Poisoned)?;
            self.storage_lookups.fetch_add(1, Ordering::Relaxed);
            db.hash_exists(hash)?
        };

        self.cache
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .insert(hash.to_string(), present);
        trace!("Storage lookup for {}: {}", hash, present);
        Ok(present)
    }

    /// Claim `record.hash` for `record.path`.
    ///
    /// Returns `StorageError::AlreadyExists` when another record holds the
    /// hash; callers treat that file as a duplicate.
    pub fn insert(&self, record: &FileRecord) -> Result<()> {
        {
            let mut db = self.db.lock().map_err(|_| StorageError::Poisoned)?;
            db.insert_file_record(record)?;
        }
        self.cache
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .insert(record.hash.clone(), true);
        debug!("Indexed {} as {}", record.path, record.hash);
        Ok(())
    }

    /// Fetch the first-seen record for a hash straight from storage.
    pub fn get(&self, hash: &str) -> Result<Option<FileRecord>> {
        let db = self.db.lock().map_err(|_| StorageError::Poisoned)?;
        db.find_by_hash(hash)
    }

    pub fn count(&self) -> Result<u64> {
        let db = self.db.lock().map_err(|_| StorageError::Poisoned)?;
        db.count_file_records()
    }

    /// Number of `exists` calls that had to go to storage.
    pub fn storage_lookups(&self) -> u64 {
        self.storage_lookups.load(Ordering::Relaxed)
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}
