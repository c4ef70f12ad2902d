//! Discovery and opening of legacy snapshot generations on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::file::FileStore;
use crate::memory::MemoryStore;
use crate::traits::KvStore;

/// Opens the backend of a single legacy snapshot generation.
pub trait StoreFactory: Send + Sync {
    fn open(&self, path: &Path) -> StoreResult<Arc<dyn KvStore>>;
}

/// Opens generations as [`FileStore`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileStoreFactory;

impl StoreFactory for FileStoreFactory {
    fn open(&self, path: &Path) -> StoreResult<Arc<dyn KvStore>> {
        Ok(Arc::new(FileStore::open(path)?))
    }
}

/// Opens every generation as an empty [`MemoryStore`].
///
/// Directories are still created so that the on-disk layout and the id
/// sequence behave exactly as with a durable backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryStoreFactory;

impl StoreFactory for MemoryStoreFactory {
    fn open(&self, path: &Path) -> StoreResult<Arc<dyn KvStore>> {
        fs::create_dir_all(path)?;
        Ok(Arc::new(MemoryStore::new()))
    }
}

/// An opened legacy snapshot generation.
#[derive(Clone)]
pub struct Generation {
    pub id: u32,
    pub path: PathBuf,
    pub store: Arc<dyn KvStore>,
}

impl Generation {
    /// Open generation `id` under `root` through `factory`.
    pub fn open(root: &Path, id: u32, factory: &dyn StoreFactory) -> StoreResult<Self> {
        let path = root.join(id.to_string());
        let store = factory.open(&path)?;
        Ok(Self { id, path, store })
    }
}

impl std::fmt::Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generation")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}

/// Result of scanning a generation root directory.
#[derive(Debug, Default)]
pub struct DiscoveredGenerations {
    /// Opened generations, ascending by id.
    pub generations: Vec<Generation>,
    /// Id the next created generation should use.
    pub next_id: u32,
    /// Error that stopped the scan early, if any. Generations opened before
    /// the error are still returned.
    pub error: Option<StoreError>,
}

/// Enumerate `<root>/<n>/` generation directories in numeric order.
///
/// A missing root yields no generations. Plain files are ignored. A
/// directory whose name is not a decimal id stops the scan.
pub fn discover_generations(root: &Path, factory: &dyn StoreFactory) -> DiscoveredGenerations {
    let mut found = BTreeMap::new();
    let error = scan(root, factory, &mut found).err();

    let next_id = found.keys().next_back().map_or(0, |max| max + 1);
    DiscoveredGenerations {
        generations: found.into_values().collect(),
        next_id,
        error,
    }
}

fn scan(
    root: &Path,
    factory: &dyn StoreFactory,
    found: &mut BTreeMap<u32, Generation>,
) -> StoreResult<()> {
    if !root.exists() {
        return Ok(());
    }
    if !root.is_dir() {
        return Err(StoreError::NotADirectory(root.to_path_buf()));
    }

    // Sorted by name so the scan stops at the same place on every platform.
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    for name in names {
        let id: u32 = name
            .parse()
            .map_err(|_| StoreError::InvalidGenerationName(name.clone()))?;

        let generation = Generation::open(root, id, factory)?;
        debug!(id, "restored snapshot generation");
        found.insert(id, generation);
    }
    Ok(())
}
