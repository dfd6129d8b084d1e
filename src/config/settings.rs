use crate::core::{Block, ChainValidator, Transaction};
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

static DEFAULT_NODE_ADDR: &str = "127.0.0.1:2001";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const MINING_ADDRESS_KEY: &str = "MINING_ADDRESS";
const NODE_ID_KEY: &str = "NODE_ID";

/// Node configuration. Loaded from an optional TOML file, then overridden by
/// the `NODE_ADDRESS`, `NODE_ID` and `MINING_ADDRESS` environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub consensus: ConsensusConfig,
    pub genesis: GenesisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub addr: String,
    pub node_id: String,
    pub data_dir: PathBuf,
    pub peers: Vec<String>,
    /// Reward recipient. A node without one does not mine.
    pub miner_id: Option<String>,
    pub sync_interval_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            addr: DEFAULT_NODE_ADDR.to_string(),
            node_id: Uuid::new_v4().to_string(),
            data_dir: PathBuf::from("data"),
            peers: Vec::new(),
            miner_id: None,
            sync_interval_secs: 60,
        }
    }
}

/// Consensus parameters. Every node on a network must agree on these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub initial_difficulty: u32,
    pub min_difficulty: u32,
    pub target_block_time_secs: u64,
    pub adjustment_interval: usize,
    pub block_reward: u64,
    /// Nonces tried between checks for a stale tip or shutdown
    pub stale_poll_interval: u64,
    pub mine_empty_blocks: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            initial_difficulty: 4,
            min_difficulty: 1,
            target_block_time_secs: 10,
            adjustment_interval: 10,
            block_reward: 10,
            stale_poll_interval: 1024,
            mine_empty_blocks: false,
        }
    }
}

impl ConsensusConfig {
    pub fn target_block_time_ms(&self) -> u64 {
        self.target_block_time_secs.saturating_mul(1000)
    }

    pub fn validator(&self) -> ChainValidator {
        ChainValidator::new(self.min_difficulty, self.block_reward)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    pub timestamp: i64,
    pub allocations: Vec<GenesisAllocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub recipient: String,
    pub amount: u64,
}

impl GenesisConfig {
    pub fn build_block(&self) -> Block {
        let allocations = self
            .allocations
            .iter()
            .map(|a| Transaction::new_reward(&a.recipient, a.amount, self.timestamp))
            .collect();
        Block::generate_genesis_block(self.timestamp, allocations)
    }
}

impl Config {
    /// Read `path` if given (a missing file is an error), then apply
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Config::default(),
        };
        config.apply_env();
        config.check()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = env::var(NODE_ADDRESS_KEY) {
            self.node.addr = addr;
        }
        if let Ok(node_id) = env::var(NODE_ID_KEY) {
            self.node.node_id = node_id;
        }
        if let Ok(miner) = env::var(MINING_ADDRESS_KEY) {
            self.node.miner_id = Some(miner);
        }
    }

    fn check(&self) -> Result<()> {
        let consensus = &self.consensus;
        if consensus.min_difficulty == 0 {
            return Err(BlockchainError::Config(
                "min_difficulty must be at least 1".to_string(),
            ));
        }
        if consensus.initial_difficulty < consensus.min_difficulty {
            return Err(BlockchainError::Config(format!(
                "initial_difficulty {} is below min_difficulty {}",
                consensus.initial_difficulty, consensus.min_difficulty
            )));
        }
        if consensus.block_reward == 0 {
            return Err(BlockchainError::Config(
                "block_reward must be positive".to_string(),
            ));
        }
        if consensus.adjustment_interval == 0 {
            return Err(BlockchainError::Config(
                "adjustment_interval must be positive".to_string(),
            ));
        }
        if let Some(a) = self.genesis.allocations.iter().find(|a| a.amount == 0) {
            return Err(BlockchainError::Config(format!(
                "genesis allocation to {} must be positive",
                a.recipient
            )));
        }
        Ok(())
    }

    pub fn is_miner(&self) -> bool {
        self.node.miner_id.is_some()
    }

    /// Per-node database directory, keyed by listening port so a restarted
    /// node finds its own data and several nodes can share a data dir
    pub fn node_db_path(&self) -> PathBuf {
        self.node
            .data_dir
            .join(format!("node_{}", self.extract_node_id_from_addr()))
    }

    /// Extract node ID from address (e.g., "127.0.0.1:2001" -> "2001")
    pub fn extract_node_id_from_addr(&self) -> String {
        match self.node.addr.rsplit(':').next() {
            Some(port) if !port.is_empty() => port.to_string(),
            _ => "default".to_string(),
        }
    }
}
