use tsm_types::Epoch;

use crate::error::StoreResult;

/// Byte-keyed store used for every storage layer of the trie.
///
/// All implementations must satisfy these invariants:
/// - `get` on a missing key returns `Ok(None)`, never an error.
/// - After `close` every operation fails with
///   [`StoreError::Closed`](crate::StoreError::Closed), including a second
///   `close`.
/// - Concurrent calls from multiple threads are safe.
pub trait KvStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Delete `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &[u8]) -> StoreResult<()>;

    /// Release the backend. Data written so far stays durable.
    fn close(&self) -> StoreResult<()>;

    /// Epoch routing, for backends that keep one partition per epoch.
    fn epoch_partitions(&self) -> Option<&dyn EpochPartitioned> {
        None
    }
}

/// Backends whose writes can be routed to an epoch-scoped partition.
pub trait EpochPartitioned {
    /// Route subsequent puts to the partition of `epoch`.
    fn set_epoch_for_put(&self, epoch: Epoch);

    /// The epoch puts are currently routed to.
    fn epoch_for_put(&self) -> Epoch;
}
