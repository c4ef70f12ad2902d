//! Tree walk of a single snapshot or checkpoint.
//!
//! Picks the target backend, copies every reachable node into it depth
//! first and streams leaves to the caller's sink until done or cancelled.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error};
use tsm_store::{KvStore, StoreFactory};
use tsm_types::TrieLeaf;

use crate::dispatcher::signaled;
use crate::error::{ManagerError, ManagerResult};
use crate::legacy::Retention;
use crate::manager::{ManagerState, Shared};
use crate::request::{RequestKind, SnapshotRequest};
use crate::throttler::Throttler;
use crate::{ACTIVE_DB_KEY, ACTIVE_DB_VAL};

/// A throttler slot, released on drop.
pub(crate) struct SlotGuard {
    throttler: Arc<dyn Throttler>,
}

impl SlotGuard {
    pub(crate) fn acquire(throttler: Arc<dyn Throttler>) -> Self {
        throttler.start_processing();
        Self { throttler }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.throttler.end_processing();
    }
}

/// Run one snapshot or checkpoint to completion and finish its request.
pub(crate) async fn run(
    shared: Arc<Shared>,
    kind: RequestKind,
    mut request: SnapshotRequest,
    slot: SlotGuard,
) {
    let mut cancel = shared.subscribe_cancel();
    let result = match target(&shared, kind) {
        Ok(Some(target)) => walk(&shared, kind, &mut request, target.as_ref(), &mut cancel).await,
        Ok(None) => Ok(()),
        Err(e) => Err(e),
    };

    let root = request.root_hash.short_hex();
    match result {
        Ok(()) => {}
        Err(ManagerError::ContextClosing) => {
            debug!(%kind, root = %root, "tree walk interrupted, storage manager is closing")
        }
        Err(e) => error!(%kind, root = %root, error = %e, "tree walk failed"),
    }

    drop(slot);
    let message = match kind {
        RequestKind::Snapshot => "trie snapshot finished",
        RequestKind::Checkpoint => "trie checkpoint finished",
    };
    shared.finish_request(request, message);
}

/// Backend the walk writes into, or `None` when the walk is abandoned.
fn target(shared: &Shared, kind: RequestKind) -> ManagerResult<Option<Arc<dyn KvStore>>> {
    match kind {
        RequestKind::Snapshot => snapshot_target(shared),
        RequestKind::Checkpoint => checkpoint_target(shared).map(Some),
    }
}

fn snapshot_target(shared: &Shared) -> ManagerResult<Option<Arc<dyn KvStore>>> {
    let target = {
        let mut state = shared.state.write().expect("lock poisoned");
        match legacy_layout(shared, &state) {
            Some((root, factory)) => {
                state
                    .legacy
                    .create_generation(root, factory, retention(shared))?
            }
            None => Arc::clone(&shared.main_storer),
        }
    };

    // The marker is read through the snapshot view: target first, then main.
    if !is_active(target.as_ref()) && !is_active(shared.main_storer.as_ref()) {
        debug!("snapshot target is not active, snapshot abandoned");
        return Ok(None);
    }
    Ok(Some(target))
}

fn checkpoint_target(shared: &Shared) -> ManagerResult<Arc<dyn KvStore>> {
    let mut state = shared.state.write().expect("lock poisoned");
    match legacy_layout(shared, &state) {
        Some((root, factory)) => Ok(state
            .legacy
            .latest_or_bootstrap(root, factory, retention(shared))?),
        None => Ok(Arc::clone(&shared.checkpoints_storer)),
    }
}

/// Generation root and factory, when the legacy layout may still grow.
fn legacy_layout<'a>(
    shared: &'a Shared,
    state: &ManagerState,
) -> Option<(&'a Path, &'a dyn StoreFactory)> {
    if !state.legacy.is_usable() {
        return None;
    }
    let root = shared.config.snapshot_db.path.as_deref()?;
    let factory = shared.generation_factory.as_deref()?;
    Some((root, factory))
}

fn retention(shared: &Shared) -> Retention {
    Retention {
        max_generations: shared.config.max_snapshots,
        keep_on_disk: shared.config.keep_snapshots,
    }
}

fn is_active(store: &dyn KvStore) -> bool {
    matches!(store.get(ACTIVE_DB_KEY), Ok(Some(value)) if value == ACTIVE_DB_VAL)
}

/// Depth-first copy of the trie rooted at the request's root into `target`.
///
/// Checkpoints copy only nodes still pending in the checkpoint hashes
/// holder; a node that is not pending has no pending descendants either.
async fn walk(
    shared: &Shared,
    kind: RequestKind,
    request: &mut SnapshotRequest,
    target: &dyn KvStore,
    cancel: &mut watch::Receiver<bool>,
) -> ManagerResult<()> {
    let mut stack = vec![request.root_hash];

    while let Some(hash) = stack.pop() {
        if *cancel.borrow() {
            return Err(ManagerError::ContextClosing);
        }
        if kind == RequestKind::Checkpoint && !shared.checkpoint_hashes.should_commit(&hash) {
            continue;
        }

        let encoded = shared.get(hash.as_ref()).map_err(|e| match e {
            ManagerError::KeyNotFound => ManagerError::MissingNode(hash),
            other => other,
        })?;
        let computed = shared.hasher.compute(&encoded);
        if computed != hash {
            return Err(ManagerError::NodeHashMismatch {
                expected: hash,
                computed,
            });
        }
        let node = shared.marshaller.decode_node(&encoded)?;

        target.put(hash.as_ref(), &encoded)?;
        if kind == RequestKind::Checkpoint {
            shared.checkpoint_hashes.remove(&hash);
        }
        request.stats.add_size(encoded.len() as u64);
        request.stats.add_trie_node();

        if let Some(leaf) = node.as_leaf() {
            request.stats.add_leaf();
            send_leaf(request, leaf.clone(), cancel).await?;
        }
        stack.extend(node.children().iter().rev().copied());
        tokio::task::yield_now().await;
    }
    Ok(())
}

async fn send_leaf(
    request: &mut SnapshotRequest,
    leaf: TrieLeaf,
    cancel: &mut watch::Receiver<bool>,
) -> ManagerResult<()> {
    let Some(sink) = request.leaves.as_ref() else {
        return Ok(());
    };
    let sent = tokio::select! {
        biased;
        _ = signaled(cancel) => return Err(ManagerError::ContextClosing),
        sent = sink.send(leaf) => sent,
    };
    if sent.is_err() {
        debug!("leaf receiver dropped, leaves no longer streamed");
        request.leaves = None;
    }
    Ok(())
}
