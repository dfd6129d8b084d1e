//! Test utilities for ledger testing

use crate::config::{Config, ConsensusConfig, GenesisAllocation, GenesisConfig};
use crate::core::{Block, Blockchain, ProofOfWork, Transaction};
use crate::error::Result;
use crate::storage::{ChainSnapshot, SnapshotStore};
use crate::utils::Keypair;
use std::sync::{Mutex, PoisonError};

/// Fixed genesis time so every node built from the same allocations agrees
/// on the genesis hash
pub const TEST_GENESIS_TIMESTAMP: i64 = 1_700_000_000_000;

/// Easy difficulty and a reward of 10
pub fn fast_consensus() -> ConsensusConfig {
    ConsensusConfig {
        initial_difficulty: 1, // Easy difficulty for fast testing
        min_difficulty: 1,
        block_reward: 10,
        stale_poll_interval: 64,
        ..ConsensusConfig::default()
    }
}

pub fn genesis_config(funded: &[(&Keypair, u64)]) -> GenesisConfig {
    GenesisConfig {
        timestamp: TEST_GENESIS_TIMESTAMP,
        allocations: funded
            .iter()
            .map(|(keypair, amount)| GenesisAllocation {
                recipient: keypair.public_key_hex(),
                amount: *amount,
            })
            .collect(),
    }
}

/// Genesis block paying each keypair its amount
pub fn funded_genesis(funded: &[(&Keypair, u64)]) -> Block {
    genesis_config(funded).build_block()
}

/// Node config with [`fast_consensus`] and a funded genesis
pub fn funded_config(funded: &[(&Keypair, u64)]) -> Config {
    let mut config = Config::default();
    config.consensus = fast_consensus();
    config.genesis = genesis_config(funded);
    config
}

/// Mine a block extending `chain` without appending it
pub fn mine_on(chain: &Blockchain, pending: &[Transaction], miner: &str) -> Block {
    ProofOfWork::mine_block(
        chain.tip(),
        pending,
        miner,
        chain.get_difficulty(),
        chain.get_consensus().block_reward,
    )
    .unwrap()
}

/// Snapshot store kept in memory
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<ChainSnapshot>>,
}

impl MemoryStore {
    pub fn with_snapshot(snapshot: ChainSnapshot) -> MemoryStore {
        MemoryStore {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }

    pub fn get_snapshot(&self) -> Option<ChainSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SnapshotStore for MemoryStore {
    fn persist(&self, snapshot: &ChainSnapshot) -> Result<()> {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<ChainSnapshot>> {
        Ok(self.get_snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funded_genesis_is_deterministic() {
        let alice = Keypair::generate().unwrap();
        let first = funded_genesis(&[(&alice, 100)]);
        let second = funded_genesis(&[(&alice, 100)]);
        assert_eq!(first.get_hash(), second.get_hash());
        assert_eq!(first.get_transactions().len(), 1);
    }

    #[test]
    fn test_mine_on_extends_tip() {
        let chain = Blockchain::new(funded_genesis(&[]), fast_consensus());
        let block = mine_on(&chain, &[], "miner");
        assert_eq!(block.get_previous_hash(), chain.get_tip_hash());
        assert_eq!(block.get_height(), 1);
        assert!(ProofOfWork::validate(&block));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::default();
        assert!(store.load().unwrap().is_none());

        let snapshot = ChainSnapshot {
            chain: vec![funded_genesis(&[])],
            balances: Default::default(),
            pending: vec![],
            difficulty: 1,
        };
        store.persist(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot));
    }
}
