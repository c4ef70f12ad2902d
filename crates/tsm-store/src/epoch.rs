//! Store split into one partition per epoch.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, error};
use tsm_types::Epoch;

use crate::error::StoreResult;
use crate::memory::MemoryStore;
use crate::traits::{EpochPartitioned, KvStore};

type PartitionFactory = Box<dyn Fn(Epoch) -> StoreResult<Arc<dyn KvStore>> + Send + Sync>;

/// Store that keeps one partition per epoch.
///
/// Puts go to the partition of the epoch last set with
/// [`EpochPartitioned::set_epoch_for_put`]; partitions are created lazily.
/// Reads search partitions from the newest epoch to the oldest. Removes apply
/// to every partition.
pub struct EpochPartitionedStore {
    partitions: RwLock<BTreeMap<Epoch, Arc<dyn KvStore>>>,
    epoch_for_put: AtomicU32,
    factory: PartitionFactory,
}

impl EpochPartitionedStore {
    /// Create a store whose partitions are built by `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(Epoch) -> StoreResult<Arc<dyn KvStore>> + Send + Sync + 'static,
    {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
            epoch_for_put: AtomicU32::new(0),
            factory: Box::new(factory),
        }
    }

    /// Store with in-memory partitions.
    pub fn in_memory() -> Self {
        Self::new(|_| Ok(Arc::new(MemoryStore::new()) as Arc<dyn KvStore>))
    }

    /// Epochs that currently have a partition, ascending.
    pub fn epochs(&self) -> Vec<Epoch> {
        self.partitions
            .read()
            .expect("lock poisoned")
            .keys()
            .copied()
            .collect()
    }

    fn partition_for_put(&self) -> StoreResult<Arc<dyn KvStore>> {
        let epoch = self.epoch_for_put.load(Ordering::SeqCst);
        if let Some(partition) = self.partitions.read().expect("lock poisoned").get(&epoch) {
            return Ok(Arc::clone(partition));
        }

        let mut partitions = self.partitions.write().expect("lock poisoned");
        if let Some(partition) = partitions.get(&epoch) {
            return Ok(Arc::clone(partition));
        }
        let partition = (self.factory)(epoch)?;
        partitions.insert(epoch, Arc::clone(&partition));
        debug!(epoch, "created epoch partition");
        Ok(partition)
    }
}

impl KvStore for EpochPartitionedStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let partitions = self.partitions.read().expect("lock poisoned");
        for partition in partitions.values().rev() {
            if let Some(value) = partition.get(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.partition_for_put()?.put(key, value)
    }

    fn remove(&self, key: &[u8]) -> StoreResult<()> {
        let partitions = self.partitions.read().expect("lock poisoned");
        for partition in partitions.values() {
            partition.remove(key)?;
        }
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let partitions = self.partitions.read().expect("lock poisoned");
        let mut result = Ok(());
        for (epoch, partition) in partitions.iter() {
            if let Err(e) = partition.close() {
                error!(epoch, error = %e, "failed to close epoch partition");
                result = Err(e);
            }
        }
        result
    }

    fn epoch_partitions(&self) -> Option<&dyn EpochPartitioned> {
        Some(self)
    }
}

impl EpochPartitioned for EpochPartitionedStore {
    fn set_epoch_for_put(&self, epoch: Epoch) {
        self.epoch_for_put.store(epoch, Ordering::SeqCst);
    }

    fn epoch_for_put(&self) -> Epoch {
        self.epoch_for_put.load(Ordering::SeqCst)
    }
}
