//! The [`TrieStorageManager`] and the state its tasks share.

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};
use tsm_crypto::{Hasher, Marshaller};
use tsm_store::{discover_generations, KvStore, StoreError, StoreFactory};
use tsm_types::{Epoch, ModifiedHashes, NodeHash};

use crate::checkpoint_hashes::CheckpointHashesHolder;
use crate::config::ManagerConfig;
use crate::dispatcher::{self, Queues};
use crate::epoch::{EpochNotifier, EpochSubscriber};
use crate::error::{ManagerError, ManagerResult};
use crate::legacy::{read_layer, LegacyPhase, LegacyStorage};
use crate::request::{LeafSink, RequestKind, SnapshotRequest};
use crate::stats::SnapshotStatisticsHandler;
use crate::throttler::{NumTasksThrottler, Throttler};
use crate::{ACTIVE_DB_KEY, ACTIVE_DB_VAL};

/// Everything needed to build a [`TrieStorageManager`].
///
/// Collaborators are optional only so that a missing one is reported as
/// [`ManagerError::MissingDependency`] instead of being unrepresentable.
#[derive(Default)]
pub struct TrieStorageManagerArgs {
    /// Legacy primary db, read until legacy storage is disabled.
    pub db: Option<Arc<dyn KvStore>>,
    pub main_storer: Option<Arc<dyn KvStore>>,
    pub checkpoints_storer: Option<Arc<dyn KvStore>>,
    pub marshaller: Option<Arc<dyn Marshaller>>,
    pub hasher: Option<Arc<dyn Hasher>>,
    pub checkpoint_hashes_holder: Option<Arc<dyn CheckpointHashesHolder>>,
    pub epoch_notifier: Option<Arc<dyn EpochNotifier>>,
    /// Opens legacy snapshot generations. Without it, or without
    /// `config.snapshot_db.path`, the legacy layout has no generations.
    pub generation_factory: Option<Arc<dyn StoreFactory>>,
    /// Overrides the throttler built from `config.max_concurrent_snapshots`.
    pub throttler: Option<Arc<dyn Throttler>>,
    pub config: ManagerConfig,
}

/// Mutable manager state, guarded by one coarse lock.
pub(crate) struct ManagerState {
    pub(crate) pruning_blocking_ops: u32,
    pub(crate) closed: bool,
    pub(crate) legacy: LegacyStorage,
}

/// State shared between the façade, the dispatcher and the workers.
pub(crate) struct Shared {
    pub(crate) main_storer: Arc<dyn KvStore>,
    pub(crate) checkpoints_storer: Arc<dyn KvStore>,
    pub(crate) marshaller: Arc<dyn Marshaller>,
    pub(crate) hasher: Arc<dyn Hasher>,
    pub(crate) checkpoint_hashes: Arc<dyn CheckpointHashesHolder>,
    pub(crate) generation_factory: Option<Arc<dyn StoreFactory>>,
    pub(crate) config: ManagerConfig,
    pub(crate) state: RwLock<ManagerState>,
    snapshot_tx: mpsc::Sender<SnapshotRequest>,
    checkpoint_tx: mpsc::Sender<SnapshotRequest>,
    /// Cancels the dispatcher and running tree walks.
    cancel_tx: watch::Sender<bool>,
    /// Broadcast released as the very last step of `close`.
    closer_tx: watch::Sender<bool>,
}

impl Shared {
    pub(crate) fn get(&self, key: &[u8]) -> ManagerResult<Vec<u8>> {
        let state = self.state.read().expect("lock poisoned");

        read_layer(self.main_storer.as_ref(), key)
            .or_else(|| read_layer(self.checkpoints_storer.as_ref(), key))
            .or_else(|| state.legacy.get(key))
            .ok_or(ManagerError::KeyNotFound)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.read().expect("lock poisoned").closed
    }

    pub(crate) fn enter_pruning_buffering_mode(&self) {
        let mut state = self.state.write().expect("lock poisoned");
        state.pruning_blocking_ops += 1;
        trace!(
            operations = state.pruning_blocking_ops,
            "enter pruning buffering state"
        );
    }

    pub(crate) fn exit_pruning_buffering_mode(&self) {
        let mut state = self.state.write().expect("lock poisoned");
        if state.pruning_blocking_ops == 0 {
            error!("exit_pruning_buffering_mode called too many times");
            return;
        }
        state.pruning_blocking_ops -= 1;
        trace!(
            operations = state.pruning_blocking_ops,
            "exit pruning buffering state"
        );
    }

    /// Finish a request that holds a pruning-block reference.
    pub(crate) fn finish_request(&self, request: SnapshotRequest, message: &'static str) {
        self.exit_pruning_buffering_mode();
        trace!(root = %request.root_hash.short_hex(), "{message}");
        request.finish();
    }

    pub(crate) fn subscribe_cancel(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    pub(crate) fn subscribe_closer(&self) -> watch::Receiver<bool> {
        self.closer_tx.subscribe()
    }

    async fn submit(&self, kind: RequestKind, request: SnapshotRequest) {
        if self.is_closed() {
            request.finish();
            return;
        }
        if request.root_hash.is_empty_trie() {
            trace!(%kind, "should not process an empty trie");
            request.finish();
            return;
        }

        self.enter_pruning_buffering_mode();
        if kind == RequestKind::Snapshot {
            self.checkpoint_hashes.remove_committed(&request.root_hash);
        }

        let queue = match kind {
            RequestKind::Snapshot => self.snapshot_tx.clone(),
            RequestKind::Checkpoint => self.checkpoint_tx.clone(),
        };
        let mut closer = self.subscribe_closer();
        let permit = tokio::select! {
            biased;
            _ = dispatcher::signaled(&mut closer) => None,
            permit = queue.reserve() => permit.ok(),
        };

        let Some(permit) = permit else {
            self.finish_request(request, "request rejected, storage manager is closing");
            return;
        };

        // The drain runs only after `closed` is set under the write lock, so
        // a send made while `closed` is observed false is always drained.
        let state = self.state.read().expect("lock poisoned");
        if state.closed {
            drop(state);
            drop(permit);
            self.finish_request(request, "request rejected, storage manager is closing");
            return;
        }
        permit.send(request);
    }

    fn epoch_confirmed(&self, epoch: Epoch) {
        let mut state = self.state.write().expect("lock poisoned");
        if epoch >= self.config.disable_old_storage_epoch {
            state.legacy.disable();
        }
        debug!(epoch, disabled = state.legacy.is_disabled(), "old trie storage");

        if state.closed {
            return;
        }
        if let Err(e) = self.main_storer.put(ACTIVE_DB_KEY, ACTIVE_DB_VAL) {
            error!(error = %e, "set db as active db");
        }

        if state.legacy.is_disabled() && !state.legacy.is_closed() {
            if let Err(e) = state.legacy.close() {
                error!(error = %e, "could not close old trie storage");
            }
        }
    }
}

impl EpochSubscriber for Shared {
    fn epoch_confirmed(&self, epoch: Epoch) {
        Shared::epoch_confirmed(self, epoch);
    }
}

/// Persists trie nodes and runs snapshots, checkpoints, the pruning guard and
/// the legacy storage migration.
///
/// Must be constructed inside a tokio runtime: construction spawns the
/// dispatcher task that admits queued snapshot and checkpoint requests.
pub struct TrieStorageManager {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TrieStorageManager {
    pub fn new(args: TrieStorageManagerArgs) -> ManagerResult<Self> {
        let db = args.db.ok_or(ManagerError::MissingDependency("legacy db"))?;
        let main_storer = args
            .main_storer
            .ok_or(ManagerError::MissingDependency("main storer"))?;
        let checkpoints_storer = args
            .checkpoints_storer
            .ok_or(ManagerError::MissingDependency("checkpoints storer"))?;
        let marshaller = args
            .marshaller
            .ok_or(ManagerError::MissingDependency("marshaller"))?;
        let hasher = args.hasher.ok_or(ManagerError::MissingDependency("hasher"))?;
        let checkpoint_hashes = args
            .checkpoint_hashes_holder
            .ok_or(ManagerError::MissingDependency("checkpoint hashes holder"))?;
        let epoch_notifier = args
            .epoch_notifier
            .ok_or(ManagerError::MissingDependency("epoch notifier"))?;

        let config = args.config;
        config.validate()?;
        let throttler: Arc<dyn Throttler> = match args.throttler {
            Some(throttler) => throttler,
            None => Arc::new(NumTasksThrottler::new(config.max_concurrent_snapshots)?),
        };

        let (snapshot_tx, snapshot_rx) = mpsc::channel(config.snapshots_buffer_len);
        let (checkpoint_tx, checkpoint_rx) = mpsc::channel(config.snapshots_buffer_len);
        let (cancel_tx, _) = watch::channel(false);
        let (closer_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            main_storer,
            checkpoints_storer,
            marshaller,
            hasher,
            checkpoint_hashes,
            generation_factory: args.generation_factory,
            config,
            state: RwLock::new(ManagerState {
                pruning_blocking_ops: 0,
                closed: false,
                legacy: LegacyStorage::new(db),
            }),
            snapshot_tx,
            checkpoint_tx,
            cancel_tx,
            closer_tx,
        });

        debug!(
            epoch = shared.config.disable_old_storage_epoch,
            "epoch for disabling old trie storage"
        );
        epoch_notifier.register_handler(shared.clone());

        {
            let mut state = shared.state.write().expect("lock poisoned");
            if state.legacy.is_usable() {
                if let (Some(root), Some(factory)) = (
                    shared.config.snapshot_db.path.as_deref(),
                    shared.generation_factory.as_deref(),
                ) {
                    let mut found = discover_generations(root, factory);
                    if let Some(e) = found.error.take() {
                        debug!(error = %e, "get snapshot generations");
                    }
                    state.legacy.adopt(found);
                }
            }
        }

        let handle = tokio::spawn(dispatcher::run(
            Arc::clone(&shared),
            Queues {
                snapshots: snapshot_rx,
                checkpoints: checkpoint_rx,
            },
            throttler,
        ));

        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    /// Look `key` up in the main store, the checkpoint store, then (while
    /// legacy storage is enabled) the legacy db and generations newest first.
    pub fn get(&self, key: &[u8]) -> ManagerResult<Vec<u8>> {
        self.shared.get(key)
    }

    /// Write to the main store only.
    pub fn put(&self, key: &[u8], value: &[u8]) -> ManagerResult<()> {
        let _state = self.shared.state.write().expect("lock poisoned");
        trace!(key_len = key.len(), "put hash in trie storage manager");
        Ok(self.shared.main_storer.put(key, value)?)
    }

    /// Remove `hash` from the main store and stop tracking it for checkpoints.
    pub fn remove(&self, hash: &NodeHash) -> ManagerResult<()> {
        let _state = self.shared.state.write().expect("lock poisoned");
        self.shared.checkpoint_hashes.remove(hash);
        Ok(self.shared.main_storer.remove(hash.as_ref())?)
    }

    /// Queue a snapshot of the trie rooted at `root_hash`.
    ///
    /// Fire-and-forget: the outcome is reported only through `leaves` being
    /// closed and `stats` being marked finished. Waits only when the snapshot
    /// queue is full.
    pub async fn take_snapshot(
        &self,
        root_hash: NodeHash,
        leaves: Option<LeafSink>,
        stats: Arc<dyn SnapshotStatisticsHandler>,
    ) {
        let request = SnapshotRequest::new(root_hash, leaves, stats);
        self.shared.submit(RequestKind::Snapshot, request).await;
    }

    /// Queue a checkpoint of the trie rooted at `root_hash`.
    pub async fn set_checkpoint(
        &self,
        root_hash: NodeHash,
        leaves: Option<LeafSink>,
        stats: Arc<dyn SnapshotStatisticsHandler>,
    ) {
        let request = SnapshotRequest::new(root_hash, leaves, stats);
        self.shared.submit(RequestKind::Checkpoint, request).await;
    }

    pub fn enter_pruning_buffering_mode(&self) {
        self.shared.enter_pruning_buffering_mode();
    }

    pub fn exit_pruning_buffering_mode(&self) {
        self.shared.exit_pruning_buffering_mode();
    }

    /// Whether any operation currently forbids pruning.
    pub fn is_pruning_blocked(&self) -> bool {
        self.shared.state.read().expect("lock poisoned").pruning_blocking_ops != 0
    }

    pub fn is_pruning_enabled(&self) -> bool {
        true
    }

    /// Track hashes modified by the commit that produced `root`. Returns
    /// `true` when a checkpoint should be scheduled.
    pub fn add_dirty_checkpoint_hashes(&self, root: NodeHash, hashes: ModifiedHashes) -> bool {
        self.shared.checkpoint_hashes.put(root, hashes)
    }

    /// Route subsequent puts to the `epoch` partition of the main store.
    pub fn set_epoch_for_put_operation(&self, epoch: Epoch) {
        match self.shared.main_storer.epoch_partitions() {
            Some(partitions) => partitions.set_epoch_for_put(epoch),
            None => error!(epoch, "invalid storer for set_epoch_for_put_operation"),
        }
    }

    /// Handle an epoch confirmation. Also invoked through the epoch notifier.
    pub fn epoch_confirmed(&self, epoch: Epoch) {
        self.shared.epoch_confirmed(epoch);
    }

    /// Batch write delay of the legacy snapshot backend, in seconds.
    pub fn snapshot_db_batch_delay(&self) -> u64 {
        self.shared.config.snapshot_db.batch_delay_seconds
    }

    pub fn is_legacy_storage_disabled(&self) -> bool {
        self.shared
            .state
            .read()
            .expect("lock poisoned")
            .legacy
            .is_disabled()
    }

    pub fn legacy_phase(&self) -> LegacyPhase {
        self.shared.state.read().expect("lock poisoned").legacy.phase()
    }

    /// Ids of the readable legacy snapshot generations, oldest first.
    pub fn legacy_generation_ids(&self) -> Vec<u32> {
        self.shared
            .state
            .read()
            .expect("lock poisoned")
            .legacy
            .generation_ids()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Cancel background work and close every backend.
    ///
    /// Every store is closed even if an earlier one fails; the last failure
    /// is returned. Requests still queued are finished by the dispatcher
    /// once the shutdown broadcast is released. Calling `close` again is a
    /// no-op.
    pub fn close(&self) -> ManagerResult<()> {
        let mut state = self.shared.state.write().expect("lock poisoned");
        if state.closed {
            return Ok(());
        }

        self.shared.cancel_tx.send_replace(true);
        state.closed = true;

        let mut last_error: Option<StoreError> = None;
        if !state.legacy.is_closed() {
            if let Err(e) = state.legacy.close() {
                error!(error = %e, "trie storage manager close old storage");
                last_error = Some(e);
            }
        }
        if let Err(e) = self.shared.main_storer.close() {
            error!(error = %e, "trie storage manager close main storer");
            last_error = Some(e);
        }
        if let Err(e) = self.shared.checkpoints_storer.close() {
            error!(error = %e, "trie storage manager close checkpoints storer");
            last_error = Some(e);
        }

        // Last step: waiters on the broadcast must observe finished state.
        self.shared.closer_tx.send_replace(true);
        drop(state);

        match last_error {
            Some(e) => Err(ManagerError::CloseFailed(e)),
            None => Ok(()),
        }
    }

    /// Wait for the dispatcher to stop and drain its queues. Only meaningful
    /// after [`close`](Self::close).
    pub async fn wait_for_shutdown(&self) {
        let handle = self.dispatcher.lock().expect("lock poisoned").take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "dispatcher task failed");
            }
        }
    }
}

impl std::fmt::Debug for TrieStorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.read().expect("lock poisoned");
        f.debug_struct("TrieStorageManager")
            .field("pruning_blocking_ops", &state.pruning_blocking_ops)
            .field("closed", &state.closed)
            .field("legacy_phase", &state.legacy.phase())
            .field("legacy_disabled", &state.legacy.is_disabled())
            .finish()
    }
}
