//! Foundation types for the trie storage manager.
//!
//! Every other `tsm` crate depends on `tsm-types`. The types here describe
//! what the storage layer needs to know about a Merkle-Patricia trie and
//! nothing more: nodes are content-addressed by a [`NodeHash`], a decoded
//! [`TrieNode`] exposes its children and (for leaves) its key/value pair.
//!
//! # Key Types
//!
//! - [`NodeHash`] -- 32-byte content address of a trie node
//! - [`EMPTY_TRIE_HASH`] -- root hash of a trie with no entries
//! - [`TrieNode`] -- decoded node shape consumed by tree walks
//! - [`TrieLeaf`] -- key/value pair streamed out of snapshot walks
//! - [`ModifiedHashes`] -- set of node hashes touched since the last checkpoint

pub mod error;
pub mod hash;
pub mod node;

use std::collections::HashSet;

pub use error::TypeError;
pub use hash::{NodeHash, EMPTY_TRIE_HASH};
pub use node::{TrieLeaf, TrieNode};

/// Blockchain epoch number.
pub type Epoch = u32;

/// Node hashes modified by a trie commit and not yet checkpointed.
pub type ModifiedHashes = HashSet<NodeHash>;
