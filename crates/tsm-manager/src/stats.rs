use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

/// Collects statistics for snapshot and checkpoint walks.
///
/// Callers announce work with [`new_snapshot_started`] before submitting a
/// request; the storage manager calls [`snapshot_finished`] exactly once per
/// submitted request, whether or not it ran.
///
/// [`new_snapshot_started`]: SnapshotStatisticsHandler::new_snapshot_started
/// [`snapshot_finished`]: SnapshotStatisticsHandler::snapshot_finished
#[async_trait]
pub trait SnapshotStatisticsHandler: Send + Sync {
    fn new_snapshot_started(&self);

    /// Record `size` bytes written to the target backend.
    fn add_size(&self, size: u64);

    fn add_trie_node(&self);

    fn add_leaf(&self);

    fn snapshot_finished(&self);

    /// Resolve once every started snapshot has finished.
    async fn wait_for_snapshots_to_finish(&self);
}

/// Default statistics collector.
#[derive(Debug)]
pub struct SnapshotStatistics {
    started_at: Instant,
    size: AtomicU64,
    trie_nodes: AtomicU64,
    leaves: AtomicU64,
    in_progress: AtomicUsize,
    finished: AtomicUsize,
    finished_notify: Notify,
}

impl SnapshotStatistics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            size: AtomicU64::new(0),
            trie_nodes: AtomicU64::new(0),
            leaves: AtomicU64::new(0),
            in_progress: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            finished_notify: Notify::new(),
        }
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    pub fn trie_nodes(&self) -> u64 {
        self.trie_nodes.load(Ordering::SeqCst)
    }

    pub fn leaves(&self) -> u64 {
        self.leaves.load(Ordering::SeqCst)
    }

    /// Number of `snapshot_finished` calls so far.
    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn in_progress(&self) -> usize {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for SnapshotStatistics {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStatisticsHandler for SnapshotStatistics {
    fn new_snapshot_started(&self) {
        self.in_progress.fetch_add(1, Ordering::SeqCst);
    }

    fn add_size(&self, size: u64) {
        self.size.fetch_add(size, Ordering::SeqCst);
    }

    fn add_trie_node(&self) {
        self.trie_nodes.fetch_add(1, Ordering::SeqCst);
    }

    fn add_leaf(&self) {
        self.leaves.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot_finished(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
        let _ = self
            .in_progress
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.finished_notify.notify_waiters();
    }

    async fn wait_for_snapshots_to_finish(&self) {
        loop {
            let notified = self.finished_notify.notified();
            if self.in_progress() == 0 {
                return;
            }
            notified.await;
        }
    }
}
