/// Sync configuration.
///
/// Compile-time limits plus the tunables a node operator may override from YAML.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Maximum blocks accepted in a single `getBlocksFromId` response.
pub const MAX_BLOCKS_PER_REQUEST: usize = 10;

/// Maximum request rounds a block sync run performs before giving up.
/// Bounds the work a peer can cause by advertising a very tall chain.
pub const MAX_SYNC_ROUNDS: usize = 512;

/// Maximum transactions accepted in a single pending-transactions response.
pub const MAX_TRANSACTIONS_PER_RESPONSE: usize = 100;

/// Number of recent canonical block ids offered when searching for a common block.
pub const COMMON_BLOCK_WINDOW: u64 = 101;

pub const GET_TRANSACTIONS_PROCEDURE: &str = "getTransactions";
pub const GET_BLOCKS_FROM_ID_PROCEDURE: &str = "getBlocksFromId";
pub const GET_HIGHEST_COMMON_BLOCK_PROCEDURE: &str = "getHighestCommonBlock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_blocks_per_request: usize,
    pub max_sync_rounds: usize,
    pub common_block_window: u64,
    pub transactions_procedure: String,
    pub blocks_procedure: String,
    pub common_block_procedure: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_blocks_per_request: MAX_BLOCKS_PER_REQUEST,
            max_sync_rounds: MAX_SYNC_ROUNDS,
            common_block_window: COMMON_BLOCK_WINDOW,
            transactions_procedure: GET_TRANSACTIONS_PROCEDURE.to_string(),
            blocks_procedure: GET_BLOCKS_FROM_ID_PROCEDURE.to_string(),
            common_block_procedure: GET_HIGHEST_COMMON_BLOCK_PROCEDURE.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SyncConfig =
            serde_yaml::from_str(yaml).context("failed to parse sync config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open sync config {}", path.display()))?;
        let config: SyncConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse sync config {}", path.display()))?;
        config.validate()?;

        info!(
            path = %path.display(),
            max_blocks_per_request = config.max_blocks_per_request,
            max_sync_rounds = config.max_sync_rounds,
            "Sync config loaded"
        );

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            (1..=MAX_BLOCKS_PER_REQUEST).contains(&self.max_blocks_per_request),
            "max_blocks_per_request must be between 1 and {MAX_BLOCKS_PER_REQUEST}"
        );
        anyhow::ensure!(self.max_sync_rounds > 0, "max_sync_rounds must be positive");
        anyhow::ensure!(
            self.common_block_window > 0,
            "common_block_window must be positive"
        );
        Ok(())
    }
}
