use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tsm_types::Epoch;

use crate::error::{ManagerError, ManagerResult};

/// Tuning knobs for the trie storage manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Capacity of each of the snapshot and checkpoint queues.
    pub snapshots_buffer_len: usize,
    /// Maximum number of snapshot/checkpoint workers running at once.
    #[serde(alias = "snapshots_goroutine_num")]
    pub max_concurrent_snapshots: usize,
    /// Number of legacy snapshot generations kept readable.
    pub max_snapshots: usize,
    /// Keep evicted generations on disk instead of deleting them.
    pub keep_snapshots: bool,
    /// First epoch at which the legacy storage layout is disabled.
    pub disable_old_storage_epoch: Epoch,
    /// How often the dispatcher re-checks the throttler for a free slot.
    pub throttle_poll_interval_ms: u64,
    /// Byte budget of pending checkpoint hashes before a checkpoint is due.
    pub checkpoint_hashes_max_size: u64,
    /// Legacy snapshot generation layout.
    pub snapshot_db: SnapshotDbConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            snapshots_buffer_len: 10,
            max_concurrent_snapshots: 2,
            max_snapshots: 2,
            keep_snapshots: false,
            disable_old_storage_epoch: Epoch::MAX,
            throttle_poll_interval_ms: 100,
            checkpoint_hashes_max_size: 8 * 1024 * 1024,
            snapshot_db: SnapshotDbConfig::default(),
        }
    }
}

/// Where legacy snapshot generations live.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotDbConfig {
    /// Root directory holding one sub-directory per generation. Without it no
    /// generations are discovered or created.
    pub path: Option<PathBuf>,
    /// Batch write delay of the generation backend, in seconds.
    pub batch_delay_seconds: u64,
}

impl ManagerConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(input: &str) -> ManagerResult<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| ManagerError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> ManagerResult<Self> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> ManagerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ManagerError::ConfigParse(e.to_string()))
    }

    pub fn validate(&self) -> ManagerResult<()> {
        if self.snapshots_buffer_len == 0 {
            return Err(ManagerError::InvalidConfig(
                "snapshots_buffer_len must be at least 1".into(),
            ));
        }
        if self.max_concurrent_snapshots == 0 {
            return Err(ManagerError::InvalidConfig(
                "max_concurrent_snapshots must be at least 1".into(),
            ));
        }
        if self.max_snapshots == 0 {
            return Err(ManagerError::InvalidConfig(
                "max_snapshots must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn throttle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ManagerConfig::default();
        assert_eq!(c.snapshots_buffer_len, 10);
        assert_eq!(c.max_concurrent_snapshots, 2);
        assert_eq!(c.disable_old_storage_epoch, u32::MAX);
        assert_eq!(c.throttle_poll_interval(), Duration::from_millis(100));
        assert!(c.snapshot_db.path.is_none());
        c.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ManagerConfig::from_toml_str(
            r#"
            snapshots_goroutine_num = 4
            disable_old_storage_epoch = 12

            [snapshot_db]
            path = "/var/lib/node/snapshots"
            "#,
        )
        .unwrap();
        assert_eq!(c.max_concurrent_snapshots, 4);
        assert_eq!(c.disable_old_storage_epoch, 12);
        assert_eq!(c.snapshot_db.path, Some(PathBuf::from("/var/lib/node/snapshots")));
        assert_eq!(c.snapshots_buffer_len, 10);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = ManagerConfig::from_toml_str("max_concurrent_snapshots = 0").unwrap_err();
        assert!(matches!(err, ManagerError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = ManagerConfig::from_toml_str("max_snapshots = \"many\"").unwrap_err();
        assert!(matches!(err, ManagerError::ConfigParse(_)));
    }

    #[test]
    fn toml_output_parses_back() {
        let mut c = ManagerConfig::default();
        c.keep_snapshots = true;
        c.snapshot_db.batch_delay_seconds = 3;
        let text = c.to_toml_string().unwrap();
        assert_eq!(ManagerConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tsm.toml");
        std::fs::write(&path, "max_snapshots = 5\n").unwrap();
        assert_eq!(ManagerConfig::load(&path).unwrap().max_snapshots, 5);
    }
}
