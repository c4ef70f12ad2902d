//! Admission loop for queued snapshot and checkpoint requests.
//!
//! A single task pulls requests off both queues, waits for a throttler slot
//! and hands each one to a worker. On close it finishes whatever is left in
//! the queues.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::error::{ManagerError, ManagerResult};
use crate::manager::Shared;
use crate::request::{RequestKind, SnapshotRequest};
use crate::throttler::Throttler;
use crate::worker::{self, SlotGuard};

/// Receiving halves of the snapshot and checkpoint queues.
pub(crate) struct Queues {
    pub(crate) snapshots: mpsc::Receiver<SnapshotRequest>,
    pub(crate) checkpoints: mpsc::Receiver<SnapshotRequest>,
}

/// Resolve once the flag behind `rx` is set, or its sender is gone.
pub(crate) async fn signaled(rx: &mut watch::Receiver<bool>) {
    loop {
        let set = *rx.borrow_and_update();
        if set {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Admit queued requests until cancelled, then drain both queues once the
/// manager has finished closing.
pub(crate) async fn run(shared: Arc<Shared>, mut queues: Queues, throttler: Arc<dyn Throttler>) {
    let mut cancel = shared.subscribe_cancel();
    let poll = shared.config.throttle_poll_interval();

    loop {
        let (kind, request) = tokio::select! {
            _ = signaled(&mut cancel) => break,
            Some(request) = queues.snapshots.recv() => (RequestKind::Snapshot, request),
            Some(request) = queues.checkpoints.recv() => (RequestKind::Checkpoint, request),
            else => break,
        };

        if let Err(e) = wait_for_capacity(throttler.as_ref(), &mut cancel, poll).await {
            debug!(%kind, root = %request.root_hash.short_hex(), error = %e, "dispatcher stopping");
            shared.finish_request(request, "did not start snapshot, dispatcher is closing");
            break;
        }

        trace!(%kind, root = %request.root_hash.short_hex(), "starting tree walk");
        let slot = SlotGuard::acquire(Arc::clone(&throttler));
        tokio::spawn(worker::run(Arc::clone(&shared), kind, request, slot));
    }

    drain(&shared, queues).await;
}

async fn wait_for_capacity(
    throttler: &dyn Throttler,
    cancel: &mut watch::Receiver<bool>,
    poll: Duration,
) -> ManagerResult<()> {
    loop {
        if throttler.can_process() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(poll) => continue,
            _ = signaled(cancel) => return Err(ManagerError::TimedOutWaitingToStart),
        }
    }
}

/// Finish every request left in the queues.
///
/// Runs after the shutdown broadcast, when no new request can be accepted;
/// `recv` still waits for senders holding a reserved slot to either send or
/// give it back.
async fn drain(shared: &Shared, mut queues: Queues) {
    let mut closer = shared.subscribe_closer();
    signaled(&mut closer).await;

    queues.snapshots.close();
    queues.checkpoints.close();

    let mut drained = 0usize;
    while let Some(request) = queues.snapshots.recv().await {
        shared.finish_request(request, "trie snapshot finished on close");
        drained += 1;
    }
    while let Some(request) = queues.checkpoints.recv().await {
        shared.finish_request(request, "trie checkpoint finished on close");
        drained += 1;
    }
    debug!(drained, "dispatcher stopped");
}
