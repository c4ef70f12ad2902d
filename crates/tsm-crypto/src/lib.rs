//! Hashing and marshaling collaborators for the trie storage manager.
//!
//! The storage manager treats both as opaque: a [`Hasher`] turns encoded node
//! bytes into a [`NodeHash`](tsm_types::NodeHash), a [`Marshaller`] turns
//! encoded bytes into a [`TrieNode`](tsm_types::TrieNode) and back. Default
//! implementations use BLAKE3 and bincode.

pub mod error;
pub mod hasher;
pub mod marshal;

pub use error::{CodecError, CodecResult};
pub use hasher::{Blake3Hasher, Hasher};
pub use marshal::{BincodeMarshaller, Marshaller};
