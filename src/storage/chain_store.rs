// Snapshot persistence on top of Sled.
// One tree holds the whole node state: blocks keyed by zero-padded height so
// they iterate in chain order, plus a handful of meta keys. Every write goes
// through a single sled transaction so a crash never leaves half a snapshot.

use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use log::info;
use sled::transaction::ConflictableTransactionError;
use sled::{Db, Tree};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const SNAPSHOT_TREE: &str = "snapshot";
const META_LENGTH_KEY: &str = "meta:length";
const META_TIP_HASH_KEY: &str = "meta:tip_hash";
const META_DIFFICULTY_KEY: &str = "meta:difficulty";
const META_BALANCES_KEY: &str = "meta:balances";
const META_PENDING_KEY: &str = "meta:pending";

/// Everything a node needs to resume: the chain, the balances it derived,
/// its pending transactions and the difficulty for the next block.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub balances: BTreeMap<String, i128>,
    pub pending: Vec<Transaction>,
    pub difficulty: u32,
}

/// Load/save contract for node state. Loaded data is untrusted: the node
/// revalidates it before use.
pub trait SnapshotStore: Send + Sync {
    fn persist(&self, snapshot: &ChainSnapshot) -> Result<()>;
    fn load(&self) -> Result<Option<ChainSnapshot>>;
}

pub struct SledStore {
    db: Db,
    tree: Tree,
    path: PathBuf,
}

fn block_key(height: u64) -> String {
    format!("block:{height:020}")
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| BlockchainError::Storage("Corrupt length record".to_string()))?;
    Ok(u64::from_be_bytes(array))
}

impl SledStore {
    pub fn open(path: &Path) -> Result<SledStore> {
        let db = sled::open(path)
            .map_err(|e| BlockchainError::Storage(format!("Failed to open database: {e}")))?;
        let tree = db
            .open_tree(SNAPSHOT_TREE)
            .map_err(|e| BlockchainError::Storage(format!("Failed to open snapshot tree: {e}")))?;
        Ok(SledStore {
            db,
            tree,
            path: path.to_path_buf(),
        })
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for SledStore {
    fn persist(&self, snapshot: &ChainSnapshot) -> Result<()> {
        // Encode outside the transaction; the closure may run more than once
        let blocks = snapshot
            .chain
            .iter()
            .enumerate()
            .map(|(height, block)| -> Result<(String, Vec<u8>)> {
                Ok((block_key(height as u64), block.serialize()?))
            })
            .collect::<Result<Vec<_>>>()?;
        let balances = serialize(&snapshot.balances)?;
        let pending = serialize(&snapshot.pending)?;
        let new_length = snapshot.chain.len() as u64;
        let tip_hash = snapshot
            .chain
            .last()
            .map(|b| b.get_hash().to_string())
            .unwrap_or_default();

        self.tree
            .transaction(|tx_db| {
                let old_length = match tx_db.get(META_LENGTH_KEY)? {
                    Some(bytes) => decode_u64(&bytes).map_err(ConflictableTransactionError::Abort)?,
                    None => 0,
                };
                for (key, bytes) in &blocks {
                    tx_db.insert(key.as_bytes(), bytes.as_slice())?;
                }
                for height in new_length..old_length {
                    tx_db.remove(block_key(height).as_bytes())?;
                }
                tx_db.insert(META_LENGTH_KEY, &new_length.to_be_bytes()[..])?;
                tx_db.insert(META_TIP_HASH_KEY, tip_hash.as_bytes())?;
                tx_db.insert(META_DIFFICULTY_KEY, &snapshot.difficulty.to_be_bytes()[..])?;
                tx_db.insert(META_BALANCES_KEY, balances.as_slice())?;
                tx_db.insert(META_PENDING_KEY, pending.as_slice())?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError<BlockchainError>| {
                BlockchainError::Storage(format!("Failed to persist snapshot: {e}"))
            })?;

        self.db
            .flush()
            .map_err(|e| BlockchainError::Storage(format!("Failed to flush snapshot: {e}")))?;
        Ok(())
    }

    fn load(&self) -> Result<Option<ChainSnapshot>> {
        let length = match self.tree.get(META_LENGTH_KEY)? {
            Some(bytes) => decode_u64(&bytes)?,
            None => return Ok(None),
        };

        let mut chain = Vec::with_capacity(length as usize);
        for height in 0..length {
            let bytes = self.tree.get(block_key(height).as_bytes())?.ok_or_else(|| {
                BlockchainError::Storage(format!("Missing block at height {height}"))
            })?;
            chain.push(Block::deserialize(&bytes)?);
        }

        let difficulty = match self.tree.get(META_DIFFICULTY_KEY)? {
            Some(bytes) => {
                let array: [u8; 4] = bytes.as_ref().try_into().map_err(|_| {
                    BlockchainError::Storage("Corrupt difficulty record".to_string())
                })?;
                u32::from_be_bytes(array)
            }
            None => return Err(BlockchainError::Storage("Missing difficulty".to_string())),
        };
        let balances: BTreeMap<String, i128> = match self.tree.get(META_BALANCES_KEY)? {
            Some(bytes) => deserialize(&bytes)?,
            None => BTreeMap::new(),
        };
        let pending: Vec<Transaction> = match self.tree.get(META_PENDING_KEY)? {
            Some(bytes) => deserialize(&bytes)?,
            None => Vec::new(),
        };

        info!(
            "Loaded snapshot from {}: {} blocks, {} pending",
            self.path.display(),
            chain.len(),
            pending.len()
        );
        Ok(Some(ChainSnapshot {
            chain,
            balances,
            pending,
            difficulty,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProofOfWork;
    use crate::utils::Keypair;
    use tempfile::tempdir;

    fn snapshot(len: usize) -> ChainSnapshot {
        let alice = Keypair::generate().unwrap();
        let mut chain = vec![Block::generate_genesis_block(
            0,
            vec![Transaction::new_reward(&alice.public_key_hex(), 100, 0)],
        )];
        while chain.len() < len {
            let tip = chain.last().unwrap();
            chain.push(ProofOfWork::mine_block(tip, &[], "m", 1, 10).unwrap());
        }
        let mut balances = BTreeMap::new();
        balances.insert(alice.public_key_hex(), 100);
        ChainSnapshot {
            chain,
            balances,
            pending: vec![Transaction::new_transfer_at(&alice, "bob", 5, 1)],
            difficulty: 3,
        }
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(&dir.path().join("db")).unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_persist_then_load() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(&dir.path().join("db")).unwrap();
        let original = snapshot(3);

        store.persist(&original).unwrap();
        assert_eq!(store.load().unwrap(), Some(original));
    }

    #[test]
    fn test_shorter_snapshot_removes_stale_blocks() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(&dir.path().join("db")).unwrap();
        store.persist(&snapshot(4)).unwrap();

        let shorter = snapshot(2);
        store.persist(&shorter).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.chain.len(), 2);
        assert!(store.tree.get(block_key(3).as_bytes()).unwrap().is_none());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let original = snapshot(2);
        {
            let store = SledStore::open(&path).unwrap();
            store.persist(&original).unwrap();
        }
        let store = SledStore::open(&path).unwrap();
        assert_eq!(store.load().unwrap(), Some(original));
    }
}
