use serde::{Deserialize, Serialize};

use crate::hash::NodeHash;

/// A key/value pair found at a trie leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieLeaf {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl TrieLeaf {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Decoded trie node, as produced by the marshaller collaborator.
///
/// Only the structure a tree walk needs is modelled: which hashes a node
/// points at and, for leaves, the key/value pair it holds. Path compression
/// and nibble encoding stay inside the trie implementation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrieNode {
    /// Inner node with up to sixteen children.
    Branch { children: Vec<NodeHash> },
    /// Shared key segment leading to a single child.
    Extension { segment: Vec<u8>, child: NodeHash },
    /// Terminal node holding a value.
    Leaf(TrieLeaf),
}

impl TrieNode {
    pub fn branch(children: Vec<NodeHash>) -> Self {
        Self::Branch { children }
    }

    pub fn extension(segment: impl Into<Vec<u8>>, child: NodeHash) -> Self {
        Self::Extension {
            segment: segment.into(),
            child,
        }
    }

    pub fn leaf(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::Leaf(TrieLeaf::new(key, value))
    }

    /// Hashes of the nodes directly below this one.
    pub fn children(&self) -> &[NodeHash] {
        match self {
            Self::Branch { children } => children,
            Self::Extension { child, .. } => std::slice::from_ref(child),
            Self::Leaf(_) => &[],
        }
    }

    /// The key/value pair if this is a leaf.
    pub fn as_leaf(&self) -> Option<&TrieLeaf> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }
}
