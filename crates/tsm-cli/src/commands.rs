use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use tokio::sync::mpsc;
use tsm_crypto::{BincodeMarshaller, Blake3Hasher};
use tsm_manager::{
    EpochNotifierHub, ManagerConfig, MemoryCheckpointHashesHolder, SnapshotStatistics,
    SnapshotStatisticsHandler, TrieStorageManager, TrieStorageManagerArgs,
};
use tsm_store::{discover_generations, FileStore, FileStoreFactory, KvStore};
use tsm_types::NodeHash;

use crate::cli::*;

const MAIN_DIR: &str = "main";
const CHECKPOINTS_DIR: &str = "checkpoints";
const LEGACY_DB_DIR: &str = "db";
const SNAPSHOTS_DIR: &str = "snapshots";
const LEAF_BUFFER: usize = 64;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Generations(args) => cmd_generations(args, cli.format),
        Command::Get(args) => cmd_get(args, cli.format).await,
        Command::Snapshot(args) => cmd_snapshot(args, cli.format).await,
        Command::Config(args) => cmd_config(args, cli.format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ManagerConfig> {
    match path {
        Some(path) => ManagerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(ManagerConfig::default()),
    }
}

/// Open every storage layer under `storage.data_dir` as a file store.
///
/// Without an explicit `snapshot_db.path`, generations live in
/// `<data-dir>/snapshots`.
pub(crate) fn open_manager(storage: &StorageArgs) -> anyhow::Result<TrieStorageManager> {
    let mut config = load_config(storage.config.as_deref())?;
    if config.snapshot_db.path.is_none() {
        config.snapshot_db.path = Some(storage.data_dir.join(SNAPSHOTS_DIR));
    }
    let notifier = match storage.epoch {
        Some(epoch) => EpochNotifierHub::starting_at(epoch),
        None => EpochNotifierHub::new(),
    };
    let open = |name: &str| -> anyhow::Result<Arc<dyn KvStore>> {
        let dir = storage.data_dir.join(name);
        let store: Arc<dyn KvStore> = Arc::new(
            FileStore::open(&dir).with_context(|| format!("opening store in {}", dir.display()))?,
        );
        Ok(store)
    };

    let args = TrieStorageManagerArgs {
        db: Some(open(LEGACY_DB_DIR)?),
        main_storer: Some(open(MAIN_DIR)?),
        checkpoints_storer: Some(open(CHECKPOINTS_DIR)?),
        marshaller: Some(Arc::new(BincodeMarshaller)),
        hasher: Some(Arc::new(Blake3Hasher::TRIE_NODE)),
        checkpoint_hashes_holder: Some(Arc::new(MemoryCheckpointHashesHolder::new(
            config.checkpoint_hashes_max_size,
        ))),
        epoch_notifier: Some(Arc::new(notifier)),
        generation_factory: Some(Arc::new(FileStoreFactory)),
        throttler: None,
        config,
    };
    TrieStorageManager::new(args).context("opening trie storage manager")
}

async fn shutdown(manager: &TrieStorageManager) -> anyhow::Result<()> {
    let closed = manager.close();
    manager.wait_for_shutdown().await;
    closed.context("closing trie storage manager")
}

// ---------------------------------------------------------------------------
// generations
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct GenerationEntry {
    pub(crate) id: u32,
    pub(crate) path: String,
}

pub(crate) fn list_generations(dir: &Path) -> anyhow::Result<Vec<GenerationEntry>> {
    let found = discover_generations(dir, &FileStoreFactory);
    if let Some(e) = &found.error {
        tracing::warn!(error = %e, "generation scan stopped early");
    }
    let mut entries = Vec::with_capacity(found.generations.len());
    for generation in found.generations {
        generation
            .store
            .close()
            .with_context(|| format!("closing generation {}", generation.id))?;
        entries.push(GenerationEntry {
            id: generation.id,
            path: generation.path.display().to_string(),
        });
    }
    Ok(entries)
}

fn cmd_generations(args: GenerationsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let entries = list_generations(&args.dir)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text if entries.is_empty() => {
            println!("No snapshot generations in {}", args.dir.display())
        }
        OutputFormat::Text => {
            for entry in &entries {
                println!("{}  {}", entry.id.to_string().yellow().bold(), entry.path.dimmed());
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// get
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GetOutput<'a> {
    key: &'a str,
    value: String,
}

async fn cmd_get(args: GetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let key = hex::decode(&args.key).context("key must be hex encoded")?;
    let manager = open_manager(&args.storage)?;
    let value = manager.get(&key);
    shutdown(&manager).await?;
    let value = value.with_context(|| format!("reading key {}", args.key))?;

    match format {
        OutputFormat::Json => {
            let output = GetOutput {
                key: &args.key,
                value: hex::encode(&value),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => println!("{} {}", "value:".green(), hex::encode(&value)),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct LeafEntry {
    pub(crate) key: String,
    pub(crate) value: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SnapshotReport {
    pub(crate) root: String,
    pub(crate) leaves: Vec<LeafEntry>,
    pub(crate) trie_nodes: u64,
    pub(crate) size: u64,
    pub(crate) generations: Vec<u32>,
    pub(crate) elapsed_ms: u128,
}

/// Snapshot `root` and collect the streamed leaves.
pub(crate) async fn take_snapshot(manager: &TrieStorageManager, root: NodeHash) -> SnapshotReport {
    let stats = Arc::new(SnapshotStatistics::new());
    stats.new_snapshot_started();
    let (tx, mut rx) = mpsc::channel(LEAF_BUFFER);
    manager.take_snapshot(root, Some(tx), stats.clone()).await;

    let mut leaves = Vec::new();
    while let Some(leaf) = rx.recv().await {
        leaves.push(LeafEntry {
            key: hex::encode(&leaf.key),
            value: hex::encode(&leaf.value),
        });
    }
    stats.wait_for_snapshots_to_finish().await;

    SnapshotReport {
        root: root.to_hex(),
        leaves,
        trie_nodes: stats.trie_nodes(),
        size: stats.size(),
        generations: manager.legacy_generation_ids(),
        elapsed_ms: stats.elapsed().as_millis(),
    }
}

async fn cmd_snapshot(args: SnapshotArgs, format: OutputFormat) -> anyhow::Result<()> {
    let root = NodeHash::from_hex(&args.root).context("root must be a hex encoded hash")?;
    let manager = open_manager(&args.storage)?;
    let report = take_snapshot(&manager, root).await;
    shutdown(&manager).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            for leaf in &report.leaves {
                println!("  {} = {}", leaf.key.cyan(), leaf.value);
            }
            println!(
                "{} Snapshot of {}: {} nodes, {} leaves, {} bytes in {} ms",
                "✓".green().bold(),
                root.short_hex().yellow(),
                report.trie_nodes,
                report.leaves.len(),
                report.size,
                report.elapsed_ms,
            );
            if report.trie_nodes == 0 {
                println!(
                    "  {} nothing copied; check that the root exists and the store is active (--epoch)",
                    "note:".yellow()
                );
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config(args: ConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.path.as_deref())?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tsm_crypto::{Hasher, Marshaller};
    use tsm_types::TrieNode;

    fn storage(dir: &Path, epoch: Option<u32>) -> StorageArgs {
        StorageArgs {
            data_dir: dir.to_path_buf(),
            config: None,
            epoch,
        }
    }

    fn put_node(manager: &TrieStorageManager, node: &TrieNode) -> NodeHash {
        let encoded = BincodeMarshaller.encode_node(node).unwrap();
        let hash = Blake3Hasher::TRIE_NODE.compute(&encoded);
        manager.put(hash.as_ref(), &encoded).unwrap();
        hash
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let manager = open_manager(&storage(dir.path(), None)).unwrap();
        manager.put(b"key", b"value").unwrap();
        shutdown(&manager).await.unwrap();

        let manager = open_manager(&storage(dir.path(), None)).unwrap();
        assert_eq!(manager.get(b"key").unwrap(), b"value");
        shutdown(&manager).await.unwrap();
    }

    #[tokio::test]
    async fn snapshot_writes_a_generation() {
        let dir = TempDir::new().unwrap();
        let manager = open_manager(&storage(dir.path(), Some(1))).unwrap();
        let left = put_node(&manager, &TrieNode::leaf("a", "1"));
        let right = put_node(&manager, &TrieNode::leaf("b", "2"));
        let root = put_node(&manager, &TrieNode::branch(vec![left, right]));

        let report = take_snapshot(&manager, root).await;
        shutdown(&manager).await.unwrap();

        assert_eq!(report.trie_nodes, 3);
        assert_eq!(report.leaves.len(), 2);
        assert_eq!(report.leaves[0].key, hex::encode("a"));
        assert_eq!(report.generations, vec![0]);

        let listed = list_generations(&dir.path().join(SNAPSHOTS_DIR)).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, 0);
    }

    #[tokio::test]
    async fn snapshot_of_unknown_root_copies_nothing() {
        let dir = TempDir::new().unwrap();
        let manager = open_manager(&storage(dir.path(), Some(1))).unwrap();

        let report = take_snapshot(&manager, NodeHash::from_hash([7; 32])).await;
        shutdown(&manager).await.unwrap();

        assert_eq!(report.trie_nodes, 0);
        assert!(report.leaves.is_empty());
    }

    #[test]
    fn missing_generation_dir_lists_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(list_generations(&dir.path().join("absent")).unwrap().is_empty());
    }
}
