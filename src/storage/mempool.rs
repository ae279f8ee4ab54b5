use crate::core::{Tracker, TrackerStatus};
use crate::error::{LedgerError, Result};
use crate::storage::atomic_write;
use crate::storage::encrypted::StorageCipher;
use log::{info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub const MEMPOOL_FILE: &str = "mempool.bin";

/// The pending-transaction pool: tracker id -> tracker, at-most-once
/// admission per id, persisted encrypted across restarts.
///
/// Mutations are serialized under the write lock and persist a consistent
/// snapshot before releasing it; the file is replaced atomically, so a
/// reader can never observe a partially-written pool.
pub struct Mempool {
    inner: RwLock<HashMap<String, Tracker>>,
    path: PathBuf,
    cipher: Arc<StorageCipher>,
}

impl Mempool {
    /// Open the pool at `dir`, decrypting the persisted file if present.
    /// A missing file is an empty pool, not an error.
    pub fn open(dir: &Path, cipher: Arc<StorageCipher>) -> Result<Mempool> {
        let path = dir.join(MEMPOOL_FILE);
        let pool = if path.exists() {
            let sealed = std::fs::read(&path)
                .map_err(|e| LedgerError::Storage(format!("Failed to read mempool file: {e}")))?;
            let plaintext = cipher.decrypt(&sealed)?;
            let pool: HashMap<String, Tracker> = serde_json::from_slice(&plaintext)?;
            info!("Loaded mempool with {} pending trackers", pool.len());
            pool
        } else {
            HashMap::new()
        };

        Ok(Mempool {
            inner: RwLock::new(pool),
            path,
            cipher,
        })
    }

    /// Insert if the id is absent. A duplicate id is a no-op, not an error.
    pub fn add(&self, tx: Tracker) -> Result<()> {
        let mut pool = self.write_lock()?;
        if pool.contains_key(&tx.id) {
            return Ok(());
        }
        pool.insert(tx.id.clone(), tx);
        self.persist(&pool)
    }

    /// Peer-sourced admission: identical to [`Mempool::add`], and in
    /// particular it never overwrites a locally-mutated entry with an older
    /// peer copy. Returns whether the entry was admitted.
    pub fn add_if_not_exists(&self, tx: Tracker) -> Result<bool> {
        let mut pool = self.write_lock()?;
        if pool.contains_key(&tx.id) {
            return Ok(false);
        }
        pool.insert(tx.id.clone(), tx);
        self.persist(&pool)?;
        Ok(true)
    }

    /// Overwrite (or insert) the entry for a locally-mutated tracker.
    pub fn update(&self, tx: Tracker) -> Result<()> {
        let mut pool = self.write_lock()?;
        pool.insert(tx.id.clone(), tx);
        self.persist(&pool)
    }

    /// Mutate an entry in place under the pool lock, persisting the result.
    /// The closure's error aborts the mutation; concurrent callers are
    /// linearized, so single-use invariants inside the closure hold.
    pub fn modify<F>(&self, id: &str, f: F) -> Result<Tracker>
    where
        F: FnOnce(&mut Tracker) -> Result<()>,
    {
        let mut pool = self.write_lock()?;
        let snapshot = {
            let tx = pool
                .get_mut(id)
                .ok_or_else(|| LedgerError::NotFound(format!("Tracker {id} not found in pool")))?;
            f(tx)?;
            tx.clone()
        };
        self.persist(&pool)?;
        Ok(snapshot)
    }

    pub fn get(&self, id: &str) -> Option<Tracker> {
        match self.inner.read() {
            Ok(pool) => pool.get(id).cloned(),
            Err(_) => {
                log::error!("Failed to acquire read lock on mempool");
                None
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        match self.inner.read() {
            Ok(pool) => pool.contains_key(id),
            Err(_) => {
                log::error!("Failed to acquire read lock on mempool");
                false
            }
        }
    }

    pub fn get_all(&self) -> Vec<Tracker> {
        match self.inner.read() {
            Ok(pool) => pool.values().cloned().collect(),
            Err(_) => {
                log::error!("Failed to acquire read lock on mempool");
                Vec::new()
            }
        }
    }

    pub fn get_by_status(&self, status: TrackerStatus) -> Vec<Tracker> {
        match self.inner.read() {
            Ok(pool) => pool
                .values()
                .filter(|tx| tx.status == status)
                .cloned()
                .collect(),
            Err(_) => {
                log::error!("Failed to acquire read lock on mempool");
                Vec::new()
            }
        }
    }

    /// Trackers ready for mining.
    pub fn completed(&self) -> Vec<Tracker> {
        self.get_by_status(TrackerStatus::Complete)
    }

    /// Delete an entry; absent ids are a no-op.
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut pool = self.write_lock()?;
        if pool.remove(id).is_none() {
            return Ok(());
        }
        self.persist(&pool)
    }

    /// Delete the entries mined into a block.
    pub fn remove_many(&self, ids: &[String]) -> Result<()> {
        let mut pool = self.write_lock()?;
        let mut changed = false;
        for id in ids {
            changed |= pool.remove(id).is_some();
        }
        if changed {
            self.persist(&pool)?;
        }
        Ok(())
    }

    /// Defensive pass: rebuild the pool keyed strictly by each entry's own
    /// id, guarding against any path that slipped an entry in under a
    /// mismatched key. Returns the number of entries retained.
    pub fn remove_duplicates(&self) -> Result<usize> {
        let mut pool = self.write_lock()?;
        let mut rebuilt: HashMap<String, Tracker> = HashMap::with_capacity(pool.len());
        for tx in pool.values() {
            rebuilt.entry(tx.id.clone()).or_insert_with(|| tx.clone());
        }

        let retained = rebuilt.len();
        if rebuilt.len() != pool.len() || rebuilt.keys().any(|id| !pool.contains_key(id)) {
            warn!("Mempool cleanse retained {retained} unique tracker entries");
            *pool = rebuilt;
            self.persist(&pool)?;
        }
        Ok(retained)
    }

    pub fn clear(&self) -> Result<()> {
        let mut pool = self.write_lock()?;
        pool.clear();
        self.persist(&pool)
    }

    /// Persist the current pool explicitly. Every mutating operation
    /// already persists; this exists for callers that want a flush point.
    pub fn save_to_disk(&self) -> Result<()> {
        let pool = self.write_lock()?;
        self.persist(&pool)
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(pool) => pool.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on mempool");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Tracker>>> {
        self.inner
            .write()
            .map_err(|_| LedgerError::Storage("Failed to acquire write lock on mempool".to_string()))
    }

    fn persist(&self, pool: &HashMap<String, Tracker>) -> Result<()> {
        let plaintext = serde_json::to_vec(pool)?;
        let sealed = self.cipher.encrypt(&plaintext)?;
        atomic_write(&self.path, &sealed)
    }
}
