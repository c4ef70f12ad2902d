//! Key-value storage backends for the trie storage manager.
//!
//! The storage manager layers several stores on top of each other (primary,
//! checkpoint, legacy db, legacy snapshot generations). All of them implement
//! the [`KvStore`] trait and are interchangeable.
//!
//! # Backends
//!
//! - [`MemoryStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileStore`] -- append-only, CRC-framed log in a single directory
//! - [`EpochPartitionedStore`] -- routes puts to a per-epoch partition
//!
//! # Legacy generations
//!
//! The pre-migration layout keeps one directory per snapshot generation,
//! named by a decimal id. [`discover_generations`] opens them in numeric
//! order through a [`StoreFactory`].

pub mod epoch;
pub mod error;
pub mod file;
pub mod generations;
pub mod memory;
pub mod traits;

pub use epoch::EpochPartitionedStore;
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use generations::{
    discover_generations, DiscoveredGenerations, FileStoreFactory, Generation,
    MemoryStoreFactory, StoreFactory,
};
pub use memory::MemoryStore;
pub use traits::{EpochPartitioned, KvStore};
