use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tsm",
    about = "Trie storage manager: inspect layered trie storage and take snapshots",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List legacy snapshot generations under a directory
    Generations(GenerationsArgs),
    /// Read a key through every storage layer
    Get(GetArgs),
    /// Copy the trie under a root hash and print its leaves
    Snapshot(SnapshotArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct GenerationsArgs {
    #[arg(long)]
    pub dir: PathBuf,
}

/// Where the storage layers live.
#[derive(Args, Clone, Debug)]
pub struct StorageArgs {
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Epoch to confirm on startup; marks the main store active
    #[arg(long)]
    pub epoch: Option<u32>,
}

#[derive(Args)]
pub struct GetArgs {
    /// Hex-encoded key
    pub key: String,
    #[command(flatten)]
    pub storage: StorageArgs,
}

#[derive(Args)]
pub struct SnapshotArgs {
    /// Hex-encoded root hash
    pub root: String,
    #[command(flatten)]
    pub storage: StorageArgs,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub path: Option<PathBuf>,
}
