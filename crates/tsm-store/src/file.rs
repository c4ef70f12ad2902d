//! Append-only log store.
//!
//! Each store is a directory holding one CRC-framed log, replayed into an
//! in-memory index on open.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::KvStore;

/// Name of the log file inside a store directory.
pub const LOG_FILE_NAME: &str = "data.log";

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// A single mutation in the log.
///
/// On-disk format:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LogRecord)]
/// ```
#[derive(Debug, Serialize, Deserialize)]
enum LogRecord {
    Put { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
}

struct FileState {
    /// `None` once the store is closed.
    writer: Option<BufWriter<File>>,
    index: HashMap<Vec<u8>, Vec<u8>>,
}

/// Durable key-value store backed by an append-only log.
///
/// Every mutation is framed with a length prefix and CRC32 and appended to
/// `<dir>/data.log`. On open the log is replayed front-to-back into an
/// in-memory index; a torn tail from a crash ends the replay, a record that
/// fails its CRC is skipped.
pub struct FileStore {
    dir: PathBuf,
    state: RwLock<FileState>,
}

impl FileStore {
    /// Open (or create) a store in the given directory.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        let log_path = dir.join(LOG_FILE_NAME);

        let index = replay(&log_path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        debug!(dir = %dir.display(), entries = index.len(), "file store opened");

        Ok(Self {
            dir: dir.to_path_buf(),
            state: RwLock::new(FileState {
                writer: Some(BufWriter::new(file)),
                index,
            }),
        })
    }

    /// Directory holding the log.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append(&self, record: &LogRecord) -> StoreResult<()> {
        let payload =
            bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let length = payload.len() as u32;
        let crc = crc32fast::hash(&payload);

        let mut state = self.state.write().expect("lock poisoned");
        let writer = state.writer.as_mut().ok_or(StoreError::Closed)?;
        writer.write_all(&length.to_le_bytes())?;
        writer.write_all(&crc.to_le_bytes())?;
        writer.write_all(&payload)?;
        writer.flush()?;

        match record {
            LogRecord::Put { key, value } => {
                state.index.insert(key.clone(), value.clone());
            }
            LogRecord::Remove { key } => {
                state.index.remove(key);
            }
        }
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let state = self.state.read().expect("lock poisoned");
        if state.writer.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(state.index.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.append(&LogRecord::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    fn remove(&self, key: &[u8]) -> StoreResult<()> {
        self.append(&LogRecord::Remove { key: key.to_vec() })
    }

    fn close(&self) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let mut writer = state.writer.take().ok_or(StoreError::Closed)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        state.index.clear();
        debug!(dir = %self.dir.display(), "file store closed");
        Ok(())
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("dir", &self.dir)
            .field("entry_count", &self.len())
            .finish()
    }
}

/// Rebuild the key index from the log at `path`.
fn replay(path: &Path) -> StoreResult<HashMap<Vec<u8>, Vec<u8>>> {
    let mut index = HashMap::new();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(index),
        Err(e) => return Err(e.into()),
    };
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE as u64 <= file_len {
        let mut header = [0u8; HEADER_SIZE];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
            warn!(offset, length, file_len, "torn record at log tail; stopping replay");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload)?;
        offset += HEADER_SIZE as u64 + length as u64;

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(
                offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; skipping record"
            );
            continue;
        }

        match bincode::deserialize::<LogRecord>(&payload) {
            Ok(LogRecord::Put { key, value }) => {
                index.insert(key, value);
            }
            Ok(LogRecord::Remove { key }) => {
                index.remove(&key);
            }
            Err(e) => {
                return Err(StoreError::CorruptRecord {
                    offset,
                    reason: e.to_string(),
                })
            }
        }
    }

    Ok(index)
}
