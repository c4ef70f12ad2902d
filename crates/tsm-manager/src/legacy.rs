//! Pre-migration storage layout: a primary db and numbered snapshot
//! generations, closed for good once the configured epoch is confirmed.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error};
use tsm_store::{DiscoveredGenerations, Generation, KvStore, StoreFactory, StoreResult};

use crate::{ACTIVE_DB_KEY, ACTIVE_DB_VAL};

/// Lifecycle of the legacy storage layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyPhase {
    /// Legacy db and generations are open.
    Active,
    /// Close in progress.
    MigratingOut,
    /// Every legacy store has been closed. Terminal.
    Closed,
}

/// Retention applied when a new generation is added.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Retention {
    pub(crate) max_generations: usize,
    pub(crate) keep_on_disk: bool,
}

/// The pre-migration storage layout: a primary db plus snapshot generations
/// ordered oldest to newest.
///
/// Mutated only under the manager's write lock. `disabled` only ever goes
/// from `false` to `true`; `phase` only moves forward.
pub(crate) struct LegacyStorage {
    phase: LegacyPhase,
    disabled: bool,
    db: Arc<dyn KvStore>,
    generations: Vec<Generation>,
    next_generation_id: u32,
}

impl LegacyStorage {
    pub(crate) fn new(db: Arc<dyn KvStore>) -> Self {
        Self {
            phase: LegacyPhase::Active,
            disabled: false,
            db,
            generations: Vec::new(),
            next_generation_id: 0,
        }
    }

    pub(crate) fn phase(&self) -> LegacyPhase {
        self.phase
    }

    pub(crate) fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.phase == LegacyPhase::Closed
    }

    /// Whether new generations may be created and reads may use the layout.
    pub(crate) fn is_usable(&self) -> bool {
        !self.disabled && self.phase == LegacyPhase::Active
    }

    pub(crate) fn disable(&mut self) {
        self.disabled = true;
    }

    pub(crate) fn adopt(&mut self, discovered: DiscoveredGenerations) {
        self.generations = discovered.generations;
        self.next_generation_id = discovered.next_id;
    }

    pub(crate) fn generation_ids(&self) -> Vec<u32> {
        self.generations.iter().map(|g| g.id).collect()
    }

    /// Look `key` up in the db, then the generations newest first.
    pub(crate) fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if !self.is_usable() {
            return None;
        }
        std::iter::once(&self.db)
            .chain(self.generations.iter().rev().map(|g| &g.store))
            .find_map(|store| read_layer(&**store, key))
    }

    /// Newest generation, creating generation `next_id` if there is none.
    pub(crate) fn latest_or_bootstrap(
        &mut self,
        root: &Path,
        factory: &dyn StoreFactory,
        retention: Retention,
    ) -> StoreResult<Arc<dyn KvStore>> {
        match self.generations.last() {
            Some(latest) => Ok(Arc::clone(&latest.store)),
            None => self.create_generation(root, factory, retention),
        }
    }

    /// Open the next generation, mark it active and apply retention.
    pub(crate) fn create_generation(
        &mut self,
        root: &Path,
        factory: &dyn StoreFactory,
        retention: Retention,
    ) -> StoreResult<Arc<dyn KvStore>> {
        let generation = Generation::open(root, self.next_generation_id, factory)?;
        generation.store.put(ACTIVE_DB_KEY, ACTIVE_DB_VAL)?;
        self.next_generation_id += 1;

        debug!(id = generation.id, "created snapshot generation");
        let store = Arc::clone(&generation.store);
        self.generations.push(generation);
        self.evict(retention);
        Ok(store)
    }

    fn evict(&mut self, retention: Retention) {
        while self.generations.len() > retention.max_generations {
            let oldest = self.generations.remove(0);
            if let Err(e) = oldest.store.close() {
                error!(id = oldest.id, error = %e, "could not close evicted snapshot generation");
            }
            if retention.keep_on_disk {
                debug!(id = oldest.id, "disconnected snapshot generation");
                continue;
            }
            match fs::remove_dir_all(&oldest.path) {
                Ok(()) => debug!(id = oldest.id, "removed snapshot generation"),
                Err(e) => error!(id = oldest.id, error = %e, "could not remove snapshot generation"),
            }
        }
    }

    /// Close the db and every generation. Runs at most once; later calls
    /// return `Ok`. Every store is attempted and the last error returned.
    pub(crate) fn close(&mut self) -> StoreResult<()> {
        if self.phase != LegacyPhase::Active {
            return Ok(());
        }
        self.phase = LegacyPhase::MigratingOut;

        let mut result = self.db.close();
        for generation in self.generations.drain(..) {
            if let Err(e) = generation.store.close() {
                error!(id = generation.id, error = %e, "could not close snapshot generation");
                result = Err(e);
            }
        }

        self.phase = LegacyPhase::Closed;
        result
    }
}

/// Read a single layer. Errors and empty values count as a miss.
pub(crate) fn read_layer(store: &dyn KvStore, key: &[u8]) -> Option<Vec<u8>> {
    match store.get(key) {
        Ok(Some(value)) if !value.is_empty() => Some(value),
        Ok(_) => None,
        Err(e) => {
            tracing::trace!(error = %e, "storage layer read failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tsm_store::{MemoryStore, MemoryStoreFactory};

    fn retention(max: usize, keep: bool) -> Retention {
        Retention {
            max_generations: max,
            keep_on_disk: keep,
        }
    }

    #[test]
    fn reads_prefer_db_then_newest_generation() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MemoryStore::new());
        let mut legacy = LegacyStorage::new(db.clone());

        let older = legacy
            .create_generation(dir.path(), &MemoryStoreFactory, retention(5, false))
            .unwrap();
        let newer = legacy
            .create_generation(dir.path(), &MemoryStoreFactory, retention(5, false))
            .unwrap();
        older.put(b"k", b"older").unwrap();
        newer.put(b"k", b"newer").unwrap();
        assert_eq!(legacy.get(b"k"), Some(b"newer".to_vec()));

        db.put(b"k", b"db").unwrap();
        assert_eq!(legacy.get(b"k"), Some(b"db".to_vec()));
    }

    #[test]
    fn disabled_layout_is_not_read() {
        let db = Arc::new(MemoryStore::new());
        db.put(b"k", b"v").unwrap();
        let mut legacy = LegacyStorage::new(db);
        legacy.disable();
        assert!(legacy.get(b"k").is_none());
        assert!(!legacy.is_usable());
    }

    #[test]
    fn new_generations_carry_the_active_marker() {
        let dir = TempDir::new().unwrap();
        let mut legacy = LegacyStorage::new(Arc::new(MemoryStore::new()));
        let store = legacy
            .create_generation(dir.path(), &MemoryStoreFactory, retention(2, false))
            .unwrap();
        assert_eq!(store.get(ACTIVE_DB_KEY).unwrap(), Some(ACTIVE_DB_VAL.to_vec()));
        assert!(dir.path().join("0").is_dir());
    }

    #[test]
    fn retention_removes_oldest_directory() {
        let dir = TempDir::new().unwrap();
        let mut legacy = LegacyStorage::new(Arc::new(MemoryStore::new()));
        for _ in 0..3 {
            legacy
                .create_generation(dir.path(), &MemoryStoreFactory, retention(2, false))
                .unwrap();
        }
        assert_eq!(legacy.generation_ids(), vec![1, 2]);
        assert!(!dir.path().join("0").exists());
    }

    #[test]
    fn retention_can_keep_directories() {
        let dir = TempDir::new().unwrap();
        let mut legacy = LegacyStorage::new(Arc::new(MemoryStore::new()));
        for _ in 0..3 {
            legacy
                .create_generation(dir.path(), &MemoryStoreFactory, retention(1, true))
                .unwrap();
        }
        assert_eq!(legacy.generation_ids(), vec![2]);
        assert!(dir.path().join("0").is_dir());
        assert!(dir.path().join("1").is_dir());
    }

    #[test]
    fn bootstrap_reuses_latest_generation() {
        let dir = TempDir::new().unwrap();
        let mut legacy = LegacyStorage::new(Arc::new(MemoryStore::new()));
        let first = legacy
            .latest_or_bootstrap(dir.path(), &MemoryStoreFactory, retention(2, false))
            .unwrap();
        first.put(b"node", b"x").unwrap();
        let second = legacy
            .latest_or_bootstrap(dir.path(), &MemoryStoreFactory, retention(2, false))
            .unwrap();
        assert_eq!(second.get(b"node").unwrap(), Some(b"x".to_vec()));
        assert_eq!(legacy.generation_ids(), vec![0]);
    }

    #[test]
    fn close_runs_once() {
        let db = Arc::new(MemoryStore::new());
        let mut legacy = LegacyStorage::new(db.clone());
        legacy.close().unwrap();
        legacy.close().unwrap();
        assert_eq!(db.close_count(), 1);
        assert_eq!(legacy.phase(), LegacyPhase::Closed);
    }

    #[test]
    fn close_reports_last_failure_but_closes_everything() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MemoryStore::new());
        db.close().unwrap();
        let mut legacy = LegacyStorage::new(db.clone());
        let generation = legacy
            .create_generation(dir.path(), &MemoryStoreFactory, retention(2, false))
            .unwrap();

        assert!(legacy.close().is_err());
        assert!(matches!(generation.get(b"k"), Err(tsm_store::StoreError::Closed)));
        assert!(legacy.is_closed());
    }
}
