use tsm_types::TrieNode;

use crate::error::{CodecError, CodecResult};

/// Encodes and decodes trie nodes to and from their persisted form.
pub trait Marshaller: Send + Sync {
    fn encode_node(&self, node: &TrieNode) -> CodecResult<Vec<u8>>;

    fn decode_node(&self, data: &[u8]) -> CodecResult<TrieNode>;
}

/// Bincode node marshaller.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeMarshaller;

impl Marshaller for BincodeMarshaller {
    fn encode_node(&self, node: &TrieNode) -> CodecResult<Vec<u8>> {
        bincode::serialize(node).map_err(|e| CodecError::Serialization(e.to_string()))
    }

    fn decode_node(&self, data: &[u8]) -> CodecResult<TrieNode> {
        if data.is_empty() {
            return Err(CodecError::EmptyEncoding);
        }
        bincode::deserialize(data).map_err(|e| CodecError::Serialization(e.to_string()))
    }
}
