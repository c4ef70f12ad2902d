//! Fixtures shared by the manager tests.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tsm_crypto::{BincodeMarshaller, Blake3Hasher, Hasher, Marshaller};
use tsm_store::{KvStore, MemoryStore, StoreFactory, StoreResult};
use tsm_types::{NodeHash, TrieLeaf, TrieNode};

use crate::checkpoint_hashes::MemoryCheckpointHashesHolder;
use crate::config::ManagerConfig;
use crate::epoch::EpochNotifierHub;
use crate::manager::{TrieStorageManager, TrieStorageManagerArgs};
use crate::stats::{SnapshotStatistics, SnapshotStatisticsHandler};
use crate::throttler::NumTasksThrottler;

/// Encode `node`, store it under its hash and return the hash.
pub(crate) fn store_node(store: &dyn KvStore, node: &TrieNode) -> NodeHash {
    let encoded = BincodeMarshaller.encode_node(node).unwrap();
    let hash = Blake3Hasher::TRIE_NODE.compute(&encoded);
    store.put(hash.as_ref(), &encoded).unwrap();
    hash
}

/// A small trie written into a store.
pub(crate) struct TrieFixture {
    pub(crate) root: NodeHash,
    /// Every node hash, root first.
    pub(crate) nodes: Vec<NodeHash>,
    /// Leaf node hashes in walk order.
    pub(crate) leaf_nodes: Vec<NodeHash>,
    /// Leaves in walk order.
    pub(crate) leaves: Vec<TrieLeaf>,
}

/// Writes `branch -> [extension -> leaf a, leaf b, leaf c]`.
pub(crate) fn build_trie(store: &dyn KvStore, tag: &str) -> TrieFixture {
    let leaves = vec![
        TrieLeaf::new(format!("{tag}-a"), b"1".to_vec()),
        TrieLeaf::new(format!("{tag}-b"), b"2".to_vec()),
        TrieLeaf::new(format!("{tag}-c"), b"3".to_vec()),
    ];
    let leaf_nodes: Vec<NodeHash> = leaves
        .iter()
        .map(|leaf| store_node(store, &TrieNode::Leaf(leaf.clone())))
        .collect();
    let extension = store_node(store, &TrieNode::extension(vec![0x0a], leaf_nodes[0]));
    let root = store_node(
        store,
        &TrieNode::branch(vec![extension, leaf_nodes[1], leaf_nodes[2]]),
    );

    TrieFixture {
        root,
        nodes: vec![root, extension, leaf_nodes[0], leaf_nodes[1], leaf_nodes[2]],
        leaf_nodes,
        leaves,
    }
}

/// Opens in-memory generations and keeps a handle on each one it opened.
#[derive(Default)]
pub(crate) struct RecordingStoreFactory {
    opened: Mutex<Vec<Arc<MemoryStore>>>,
}

impl RecordingStoreFactory {
    pub(crate) fn opened(&self) -> Vec<Arc<MemoryStore>> {
        self.opened.lock().unwrap().clone()
    }
}

impl StoreFactory for RecordingStoreFactory {
    fn open(&self, path: &Path) -> StoreResult<Arc<dyn KvStore>> {
        fs::create_dir_all(path)?;
        let store = Arc::new(MemoryStore::new());
        self.opened.lock().unwrap().push(store.clone());
        Ok(store)
    }
}

/// Manager wired to in-memory collaborators that tests can inspect.
pub(crate) struct Harness {
    pub(crate) manager: TrieStorageManager,
    pub(crate) db: Arc<MemoryStore>,
    pub(crate) main: Arc<dyn KvStore>,
    pub(crate) checkpoints: Arc<MemoryStore>,
    pub(crate) holder: Arc<MemoryCheckpointHashesHolder>,
    pub(crate) notifier: Arc<EpochNotifierHub>,
    pub(crate) throttler: Arc<NumTasksThrottler>,
}

pub(crate) struct HarnessBuilder {
    config: ManagerConfig,
    main: Arc<dyn KvStore>,
    db: Arc<MemoryStore>,
    notifier: Arc<EpochNotifierHub>,
    generation_factory: Option<Arc<dyn StoreFactory>>,
}

impl HarnessBuilder {
    /// Main store already marked active through an epoch-0 notifier.
    pub(crate) fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            main: Arc::new(MemoryStore::new()),
            db: Arc::new(MemoryStore::new()),
            notifier: Arc::new(EpochNotifierHub::starting_at(0)),
            generation_factory: None,
        }
    }

    pub(crate) fn main(mut self, main: Arc<dyn KvStore>) -> Self {
        self.main = main;
        self
    }

    pub(crate) fn db(mut self, db: Arc<MemoryStore>) -> Self {
        self.db = db;
        self
    }

    pub(crate) fn notifier(mut self, notifier: Arc<EpochNotifierHub>) -> Self {
        self.notifier = notifier;
        self
    }

    pub(crate) fn generations(mut self, factory: Arc<dyn StoreFactory>) -> Self {
        self.generation_factory = Some(factory);
        self
    }

    pub(crate) fn build(self) -> Harness {
        let checkpoints = Arc::new(MemoryStore::new());
        let holder = Arc::new(MemoryCheckpointHashesHolder::new(
            self.config.checkpoint_hashes_max_size,
        ));
        let throttler =
            Arc::new(NumTasksThrottler::new(self.config.max_concurrent_snapshots).unwrap());

        let manager = TrieStorageManager::new(TrieStorageManagerArgs {
            db: Some(self.db.clone()),
            main_storer: Some(Arc::clone(&self.main)),
            checkpoints_storer: Some(checkpoints.clone()),
            marshaller: Some(Arc::new(BincodeMarshaller)),
            hasher: Some(Arc::new(Blake3Hasher::TRIE_NODE)),
            checkpoint_hashes_holder: Some(holder.clone()),
            epoch_notifier: Some(self.notifier.clone()),
            generation_factory: self.generation_factory,
            throttler: Some(throttler.clone()),
            config: self.config,
        })
        .unwrap();

        Harness {
            manager,
            db: self.db,
            main: self.main,
            checkpoints,
            holder,
            notifier: self.notifier,
            throttler,
        }
    }
}

/// Config with a short throttle poll so tests do not idle.
pub(crate) fn fast_config() -> ManagerConfig {
    ManagerConfig {
        throttle_poll_interval_ms: 5,
        ..ManagerConfig::default()
    }
}

/// Announce one operation on a fresh statistics collector.
pub(crate) fn started_stats() -> Arc<SnapshotStatistics> {
    let stats = Arc::new(SnapshotStatistics::new());
    stats.new_snapshot_started();
    stats
}

/// Wait for every started operation on `stats` to finish.
pub(crate) async fn wait_finished(stats: &SnapshotStatistics) {
    tokio::time::timeout(Duration::from_secs(5), stats.wait_for_snapshots_to_finish())
        .await
        .expect("operations did not finish in time");
}
