use tsm_types::NodeHash;

/// Computes content addresses for encoded trie nodes.
pub trait Hasher: Send + Sync {
    /// Hash the encoded bytes of a node.
    fn compute(&self, data: &[u8]) -> NodeHash;

    /// Verify that data produces the expected hash.
    fn verify(&self, data: &[u8], expected: &NodeHash) -> bool {
        self.compute(data) == *expected
    }
}

/// Domain-separated BLAKE3 node hasher.
///
/// The domain tag is prepended to every hash computation so that trie nodes
/// never collide with other content hashed by the same process.
#[derive(Clone, Copy, Debug)]
pub struct Blake3Hasher {
    domain: &'static str,
}

impl Blake3Hasher {
    /// Hasher for trie nodes.
    pub const TRIE_NODE: Self = Self {
        domain: "tsm-trie-node-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

impl Default for Blake3Hasher {
    fn default() -> Self {
        Self::TRIE_NODE
    }
}

impl Hasher for Blake3Hasher {
    fn compute(&self, data: &[u8]) -> NodeHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        NodeHash::from_hash(*hasher.finalize().as_bytes())
    }
}
