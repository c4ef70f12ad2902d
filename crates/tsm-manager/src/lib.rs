//! Trie storage manager.
//!
//! Sits between a Merkle trie and its key-value backends. Trie nodes are
//! stored under their hash; the manager owns where they live and how they
//! are copied around.
//!
//! # Responsibilities
//!
//! - Layered reads: main store, checkpoint store, then the legacy layout
//!   (primary db plus snapshot generations) until it is disabled
//! - Snapshots and checkpoints: fire-and-forget requests that copy a whole
//!   trie (or only its pending nodes) into a target backend in the
//!   background, streaming leaves to the caller
//! - Pruning guard: a counter that is non-zero while any operation needs
//!   every referenced node to stay on disk
//! - Legacy migration: on a configured epoch the legacy layout is disabled
//!   and closed, permanently
//!
//! # Concurrency
//!
//! Requests are queued on two bounded channels. A single dispatcher task
//! admits them through a [`Throttler`] and spawns one worker per request.
//! [`TrieStorageManager::close`] cancels the dispatcher and running walks,
//! closes every backend and finally releases a shutdown broadcast after
//! which the dispatcher drains and finishes every queued request.

pub mod checkpoint_hashes;
pub mod config;
mod dispatcher;
pub mod epoch;
pub mod error;
mod legacy;
pub mod manager;
pub mod request;
pub mod stats;
pub mod throttler;
mod worker;

pub use checkpoint_hashes::{CheckpointHashesHolder, MemoryCheckpointHashesHolder};
pub use config::{ManagerConfig, SnapshotDbConfig};
pub use epoch::{EpochNotifier, EpochNotifierHub, EpochSubscriber};
pub use error::{ManagerError, ManagerResult};
pub use legacy::LegacyPhase;
pub use manager::{TrieStorageManager, TrieStorageManagerArgs};
pub use request::{LeafSink, RequestKind};
pub use stats::{SnapshotStatistics, SnapshotStatisticsHandler};
pub use throttler::{NumTasksThrottler, Throttler};

/// Marker key written into a store once it holds a complete trie state.
pub const ACTIVE_DB_KEY: &[u8] = b"activeDB";

/// Value stored under [`ACTIVE_DB_KEY`].
pub const ACTIVE_DB_VAL: &[u8] = b"yes";

#[cfg(test)]
pub(crate) mod testutil;
