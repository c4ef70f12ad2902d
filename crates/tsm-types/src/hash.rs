use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Root hash of a trie with no entries. Never snapshotted or checkpointed.
pub const EMPTY_TRIE_HASH: NodeHash = NodeHash::empty();

/// Content address of a persisted trie node.
///
/// The storage manager never computes these itself; they come from the
/// hasher collaborator and are used verbatim as backend keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHash([u8; 32]);

impl NodeHash {
    /// Wrap a pre-computed 32-byte hash.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The all-zero hash, used as the empty-trie sentinel.
    pub const fn empty() -> Self {
        Self([0u8; 32])
    }

    /// Returns `true` if this is the empty-trie sentinel.
    pub fn is_empty_trie(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Build a hash from a byte slice of exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters), for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for NodeHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHash({})", self.short_hex())
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for NodeHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_trie_sentinel_is_all_zero() {
        assert!(EMPTY_TRIE_HASH.is_empty_trie());
        assert_eq!(EMPTY_TRIE_HASH.as_bytes(), &[0u8; 32]);
        assert!(!NodeHash::from_hash([1u8; 32]).is_empty_trie());
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let err = NodeHash::from_slice(&[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 3
            }
        );
    }

    #[test]
    fn hex_parse_and_display() {
        let hash = NodeHash::from_hash([0xab; 32]);
        let parsed = NodeHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(parsed, hash);
        assert_eq!(hash.short_hex(), "abababab");
        assert!(NodeHash::from_hex("zz").is_err());
    }

    #[test]
    fn debug_uses_short_hex() {
        let hash = NodeHash::from_hash([0x0f; 32]);
        assert_eq!(format!("{hash:?}"), "NodeHash(0f0f0f0f)");
    }

    proptest::proptest! {
        #[test]
        fn from_slice_accepts_any_32_bytes(bytes in proptest::array::uniform32(proptest::num::u8::ANY)) {
            let hash = NodeHash::from_slice(&bytes).unwrap();
            proptest::prop_assert_eq!(hash.as_bytes(), &bytes);
        }
    }
}
