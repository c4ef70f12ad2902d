use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tsm_types::{NodeHash, TrieLeaf};

use crate::stats::SnapshotStatisticsHandler;

/// Channel receiving the leaves of a walked trie. Dropping the sender is how
/// the manager signals that no more leaves will follow.
pub type LeafSink = mpsc::Sender<TrieLeaf>;

/// Which pipeline a request goes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Snapshot,
    Checkpoint,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot => f.write_str("snapshot"),
            Self::Checkpoint => f.write_str("checkpoint"),
        }
    }
}

/// A queued snapshot or checkpoint.
///
/// [`finish`](Self::finish) consumes the request, so a request can be
/// finished at most once.
pub(crate) struct SnapshotRequest {
    pub(crate) root_hash: NodeHash,
    pub(crate) leaves: Option<LeafSink>,
    pub(crate) stats: Arc<dyn SnapshotStatisticsHandler>,
}

impl SnapshotRequest {
    pub(crate) fn new(
        root_hash: NodeHash,
        leaves: Option<LeafSink>,
        stats: Arc<dyn SnapshotStatisticsHandler>,
    ) -> Self {
        Self {
            root_hash,
            leaves,
            stats,
        }
    }

    /// Close the leaf sink and report the request as finished.
    pub(crate) fn finish(self) {
        drop(self.leaves);
        self.stats.snapshot_finished();
    }
}

impl fmt::Debug for SnapshotRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotRequest")
            .field("root_hash", &self.root_hash)
            .field("has_leaf_sink", &self.leaves.is_some())
            .finish()
    }
}
