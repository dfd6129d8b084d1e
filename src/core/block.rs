use crate::core::{MerkleTree, Transaction};
use crate::error::Result;
use crate::utils::{deserialize, serialize, sha256_hex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Previous-hash marker carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_MINER: &str = "genesis";
pub const GENESIS_DIFFICULTY: u32 = 1;

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Block {
    height: u64,
    timestamp: i64, // Unix milliseconds
    transactions: Vec<Transaction>,
    previous_hash: String,
    hash: String,
    nonce: u64,
    difficulty: u32, // Required number of leading '0' hex characters
    mined_by: String,
    merkle_root: String,
}

impl Block {
    /// Unsealed block on top of `previous`. The nonce starts at zero and the
    /// hash is filled in for that nonce; proof-of-work searches from here.
    pub fn new_candidate(
        previous: &Block,
        transactions: Vec<Transaction>,
        difficulty: u32,
        mined_by: &str,
        timestamp: i64,
    ) -> Block {
        let merkle_root = MerkleTree::calculate_merkle_root(&transactions);
        let mut block = Block {
            height: previous.height + 1,
            timestamp,
            transactions,
            previous_hash: previous.hash.clone(),
            hash: String::new(),
            nonce: 0,
            difficulty,
            mined_by: mined_by.to_string(),
            merkle_root,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Deterministic first block. Every node given the same timestamp and
    /// allocations builds a byte-identical genesis.
    pub fn generate_genesis_block(timestamp: i64, allocations: Vec<Transaction>) -> Block {
        let merkle_root = MerkleTree::calculate_merkle_root(&allocations);
        let mut block = Block {
            height: 0,
            timestamp,
            transactions: allocations,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            hash: String::new(),
            nonce: 0,
            difficulty: GENESIS_DIFFICULTY,
            mined_by: GENESIS_MINER.to_string(),
            merkle_root,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Canonical hash: SHA-256 over the sorted-key JSON of every field
    /// except `hash` itself.
    pub fn calculate_hash(&self) -> String {
        sha256_hex(self.canonical_value().to_string().as_bytes())
    }

    fn canonical_value(&self) -> Value {
        let transactions: Vec<Value> = self
            .transactions
            .iter()
            .map(|tx| tx.canonical_value(true))
            .collect();
        json!({
            "difficulty": self.difficulty,
            "height": self.height,
            "merkle_root": self.merkle_root,
            "mined_by": self.mined_by,
            "nonce": self.nonce,
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
            "transactions": transactions,
        })
    }

    /// Set the nonce and recompute the hash. Only proof-of-work drives this.
    pub(crate) fn seal(&mut self, nonce: u64) {
        self.nonce = nonce;
        self.hash = self.calculate_hash();
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    pub fn verify_merkle_root(&self) -> bool {
        MerkleTree::calculate_merkle_root(&self.transactions) == self.merkle_root
    }

    pub fn contains_transaction(&self, tx_id: &str) -> bool {
        self.transactions.iter().any(|tx| tx.get_id() == tx_id)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_merkle_root(&self) -> &str {
        self.merkle_root.as_str()
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_mined_by(&self) -> &str {
        self.mined_by.as_str()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::merkle::EMPTY_MERKLE_ROOT;

    fn genesis() -> Block {
        Block::generate_genesis_block(0, vec![Transaction::new_reward("alice", 100, 0)])
    }

    #[test]
    fn test_genesis_is_deterministic() {
        let a = genesis();
        let b = genesis();
        assert_eq!(a.get_hash(), b.get_hash());
        assert_eq!(a.get_height(), 0);
        assert_eq!(a.get_previous_hash(), GENESIS_PREVIOUS_HASH);
        assert_eq!(a.get_difficulty(), GENESIS_DIFFICULTY);
        assert_eq!(a.calculate_hash(), a.get_hash());
    }

    #[test]
    fn test_genesis_allocations_change_hash() {
        let other = Block::generate_genesis_block(0, vec![Transaction::new_reward("bob", 100, 0)]);
        assert_ne!(genesis().get_hash(), other.get_hash());
    }

    #[test]
    fn test_candidate_links_to_previous() {
        let parent = genesis();
        let block = Block::new_candidate(&parent, vec![], 2, "miner", 5_000);

        assert_eq!(block.get_height(), 1);
        assert_eq!(block.get_previous_hash(), parent.get_hash());
        assert_eq!(block.get_nonce(), 0);
        assert_eq!(block.get_merkle_root(), EMPTY_MERKLE_ROOT);
        assert_eq!(block.get_hash(), block.calculate_hash());
    }

    #[test]
    fn test_seal_changes_hash() {
        let mut block = Block::new_candidate(&genesis(), vec![], 1, "miner", 5_000);
        let before = block.get_hash().to_string();
        block.seal(7);
        assert_eq!(block.get_nonce(), 7);
        assert_ne!(block.get_hash(), before);
        assert_eq!(block.get_hash(), block.calculate_hash());
    }

    #[test]
    fn test_merkle_root_detects_transaction_edit() {
        let block = genesis();
        assert!(block.verify_merkle_root());

        let mut value = serde_json::to_value(&block).unwrap();
        value["transactions"][0]["amount"] = json!(1_000_000);
        let edited: Block = serde_json::from_value(value).unwrap();

        assert!(!edited.verify_merkle_root());
        assert_ne!(edited.calculate_hash(), edited.get_hash());
    }

    #[test]
    fn test_storage_encoding_preserves_hash() {
        let block = genesis();
        let restored = Block::deserialize(&block.serialize().unwrap()).unwrap();
        assert_eq!(block, restored);
        assert_eq!(restored.calculate_hash(), block.get_hash());
    }
}
