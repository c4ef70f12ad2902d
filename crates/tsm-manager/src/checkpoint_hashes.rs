//! Pending checkpoint hashes, grouped by the root that modified them.

use std::sync::RwLock;

use tracing::debug;
use tsm_types::{ModifiedHashes, NodeHash};

/// Tracks node hashes that were modified but not yet written to a checkpoint.
pub trait CheckpointHashesHolder: Send + Sync {
    /// Record the hashes modified by the commit that produced `root`.
    /// Returns `true` when the holder has grown past its size budget and a
    /// checkpoint should be scheduled.
    fn put(&self, root: NodeHash, hashes: ModifiedHashes) -> bool;

    /// Drop every entry up to and including `root`; a snapshot of `root`
    /// persists all of them.
    fn remove_committed(&self, root: &NodeHash);

    /// Stop tracking a single hash.
    fn remove(&self, hash: &NodeHash);

    /// Whether `hash` is still waiting to be checkpointed.
    fn should_commit(&self, hash: &NodeHash) -> bool;
}

const HASH_SIZE: u64 = 32;

#[derive(Default)]
struct HolderState {
    /// Per-commit hash sets, oldest first, paired with their root.
    entries: Vec<(NodeHash, ModifiedHashes)>,
    current_size: u64,
}

impl HolderState {
    fn recompute_size(&mut self) {
        self.current_size = self
            .entries
            .iter()
            .map(|(_, hashes)| HASH_SIZE + hashes.len() as u64 * HASH_SIZE)
            .sum();
    }
}

/// In-memory checkpoint hash tracker with a byte budget.
pub struct MemoryCheckpointHashesHolder {
    max_size: u64,
    state: RwLock<HolderState>,
}

impl MemoryCheckpointHashesHolder {
    pub fn new(max_size: u64) -> Self {
        Self {
            max_size,
            state: RwLock::new(HolderState::default()),
        }
    }

    /// Bytes currently accounted for.
    pub fn current_size(&self) -> u64 {
        self.state.read().expect("lock poisoned").current_size
    }

    /// Roots with pending hashes, oldest first.
    pub fn pending_roots(&self) -> Vec<NodeHash> {
        let state = self.state.read().expect("lock poisoned");
        state.entries.iter().map(|(root, _)| *root).collect()
    }
}

impl CheckpointHashesHolder for MemoryCheckpointHashesHolder {
    fn put(&self, root: NodeHash, hashes: ModifiedHashes) -> bool {
        let mut state = self.state.write().expect("lock poisoned");
        if let Some((last_root, _)) = state.entries.last() {
            if *last_root == root {
                debug!(root = %root.short_hex(), "checkpoint hashes holder root hash did not change");
                return false;
            }
        }

        state.current_size += HASH_SIZE + hashes.len() as u64 * HASH_SIZE;
        state.entries.push((root, hashes));
        state.current_size > self.max_size
    }

    fn remove_committed(&self, root: &NodeHash) {
        let mut state = self.state.write().expect("lock poisoned");
        let Some(index) = state.entries.iter().position(|(r, _)| r == root) else {
            return;
        };
        state.entries.drain(..=index);
        state.recompute_size();
    }

    fn remove(&self, hash: &NodeHash) {
        let mut state = self.state.write().expect("lock poisoned");
        let mut removed = 0u64;
        for (_, hashes) in state.entries.iter_mut() {
            if hashes.remove(hash) {
                removed += 1;
            }
        }
        state.current_size = state.current_size.saturating_sub(removed * HASH_SIZE);
    }

    fn should_commit(&self, hash: &NodeHash) -> bool {
        let state = self.state.read().expect("lock poisoned");
        state.entries.iter().any(|(_, hashes)| hashes.contains(hash))
    }
}
