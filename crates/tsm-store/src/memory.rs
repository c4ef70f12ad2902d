use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::traits::KvStore;

/// In-memory, HashMap-based key-value store.
///
/// Intended for tests and embedding. Values are cloned on read/write. Write
/// and close calls are counted so callers can assert on backend traffic.
pub struct MemoryStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
    writes: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// Returns `true` if `key` is present, regardless of the closed state.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.read().expect("lock poisoned").contains_key(key)
    }

    /// Total number of successful `put` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Total number of `close` calls, successful or not.
    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;
        let mut map = self.entries.write().expect("lock poisoned");
        map.insert(key.to_vec(), value.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;
        let mut map = self.entries.write().expect("lock poisoned");
        map.remove(key);
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entry_count", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let store = MemoryStore::new();
        store.put(b"key", b"value").unwrap();
        assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn get_missing_returns_none() {
        let store = MemoryStore::new();
        assert!(store.get(b"missing").unwrap().is_none());
    }

    #[test]
    fn put_overwrites() {
        let store = MemoryStore::new();
        store.put(b"k", b"v1").unwrap();
        store.put(b"k", b"v2").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_missing_is_not_an_error() {
        let store = MemoryStore::new();
        store.put(b"k", b"v").unwrap();
        store.remove(b"k").unwrap();
        store.remove(b"k").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn operations_after_close_fail() {
        let store = MemoryStore::new();
        store.put(b"k", b"v").unwrap();
        store.close().unwrap();

        assert!(matches!(store.get(b"k"), Err(StoreError::Closed)));
        assert!(matches!(store.put(b"k", b"v"), Err(StoreError::Closed)));
        assert!(matches!(store.remove(b"k"), Err(StoreError::Closed)));
        assert!(store.contains_key(b"k"));
    }

    #[test]
    fn second_close_is_reported() {
        let store = MemoryStore::new();
        store.close().unwrap();
        assert!(matches!(store.close(), Err(StoreError::Closed)));
        assert_eq!(store.close_count(), 2);
    }

    #[test]
    fn concurrent_writers_do_not_lose_entries() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.put(&[i], &[i]).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(store.len(), 8);
    }

    #[test]
    fn debug_format() {
        let store = MemoryStore::new();
        let debug = format!("{store:?}");
        assert!(debug.contains("MemoryStore"));
        assert!(debug.contains("entry_count"));
    }
}
