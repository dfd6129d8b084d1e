// The chain a node currently believes in, plus everything derived from it:
// balances, the set of confirmed transaction ids and the difficulty the next
// block must be mined at. All of it changes together through append/replace.

use crate::config::ConsensusConfig;
use crate::core::validator::BlockFault;
use crate::core::{
    Block, ChainValidator, DifficultyAdjustment, Ledger, ValidatedChain, VerifyMode,
};
use log::info;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    ledger: Ledger,
    confirmed: HashSet<String>,    // Ids of every transaction on the chain
    block_hashes: HashSet<String>, // Hashes of every block on the chain
    difficulty: u32,               // Difficulty for the next block
    consensus: ConsensusConfig,
    validator: ChainValidator,
}

impl Blockchain {
    /// Chain holding only `genesis`
    pub fn new(genesis: Block, consensus: ConsensusConfig) -> Blockchain {
        Self::build(vec![genesis], consensus)
    }

    /// Chain from a previously validated block list (peer chain or snapshot)
    pub fn from_validated(chain: ValidatedChain, consensus: ConsensusConfig) -> Blockchain {
        Self::build(chain.into_blocks(), consensus)
    }

    fn build(blocks: Vec<Block>, consensus: ConsensusConfig) -> Blockchain {
        let validator = consensus.validator();
        let mut blockchain = Blockchain {
            blocks: Vec::new(),
            ledger: Ledger::new(),
            confirmed: HashSet::new(),
            block_hashes: HashSet::new(),
            difficulty: consensus.initial_difficulty,
            consensus,
            validator,
        };
        blockchain.reset(blocks);
        blockchain
    }

    fn reset(&mut self, blocks: Vec<Block>) {
        self.ledger = Ledger::rebuild_balances(&blocks);
        self.confirmed = blocks
            .iter()
            .flat_map(|b| b.get_transactions().iter().map(|tx| tx.get_id()))
            .collect();
        self.block_hashes = blocks.iter().map(|b| b.get_hash().to_string()).collect();
        self.blocks = blocks;
        self.recompute_difficulty();
    }

    fn recompute_difficulty(&mut self) {
        self.difficulty = DifficultyAdjustment::next_difficulty(
            &self.blocks,
            self.consensus.initial_difficulty,
            self.consensus.target_block_time_ms(),
            self.consensus.adjustment_interval,
            self.consensus.min_difficulty,
        );
    }

    /// Extend the chain by one block. The block must link to the current tip
    /// and pass validation in `mode`; signed transfers already on the chain
    /// may not appear again.
    pub fn append(&mut self, block: Block, mode: VerifyMode) -> Result<(), BlockFault> {
        self.validator.validate_block(&block, self.tip(), mode)?;
        self.check_not_confirmed(&block)?;

        self.ledger.apply_block(&block);
        self.confirmed
            .extend(block.get_transactions().iter().map(|tx| tx.get_id()));
        self.block_hashes.insert(block.get_hash().to_string());
        info!(
            "Appended block {} at height {}",
            block.get_hash(),
            block.get_height()
        );
        self.blocks.push(block);
        self.recompute_difficulty();
        Ok(())
    }

    fn check_not_confirmed(&self, block: &Block) -> Result<(), BlockFault> {
        let mut in_block = HashSet::new();
        for (index, tx) in block.get_transactions().iter().enumerate() {
            if tx.is_reward() {
                continue;
            }
            let id = tx.get_id();
            if self.confirmed.contains(&id) || !in_block.insert(id.clone()) {
                return Err(BlockFault::ReplayedTransaction { index, id });
            }
        }
        Ok(())
    }

    /// Swap in a whole validated chain, rebuilding every derived table
    pub fn replace(&mut self, chain: ValidatedChain) {
        info!(
            "Replacing chain of length {} with chain of length {}",
            self.blocks.len(),
            chain.len()
        );
        self.reset(chain.into_blocks());
    }

    pub fn tip(&self) -> &Block {
        // A Blockchain is never built without at least a genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn get_tip_hash(&self) -> &str {
        self.tip().get_hash()
    }

    pub fn get_genesis_hash(&self) -> &str {
        self.blocks[0].get_hash()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get_best_height(&self) -> u64 {
        self.tip().get_height()
    }

    pub fn get_blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn contains_block(&self, hash: &str) -> bool {
        self.block_hashes.contains(hash)
    }

    pub fn contains_transaction(&self, tx_id: &str) -> bool {
        self.confirmed.contains(tx_id)
    }

    pub fn get_ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn balance_of(&self, account: &str) -> i128 {
        self.ledger.balance_of(account)
    }

    pub fn get_balances(&self) -> &BTreeMap<String, i128> {
        self.ledger.get_balances()
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_consensus(&self) -> &ConsensusConfig {
        &self.consensus
    }

    pub fn get_validator(&self) -> &ChainValidator {
        &self.validator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ProofOfWork, Transaction};
    use crate::testnet::{fast_consensus, funded_genesis, mine_on};
    use crate::utils::Keypair;

    #[test]
    fn test_new_chain_starts_at_genesis() {
        let alice = Keypair::generate().unwrap();
        let chain = Blockchain::new(funded_genesis(&[(&alice, 100)]), fast_consensus());

        assert_eq!(chain.len(), 1);
        assert_eq!(chain.get_best_height(), 0);
        assert_eq!(chain.balance_of(&alice.public_key_hex()), 100);
        assert_eq!(chain.get_difficulty(), fast_consensus().initial_difficulty);
        assert_eq!(chain.get_tip_hash(), chain.get_genesis_hash());
    }

    #[test]
    fn test_append_updates_derived_state() {
        let alice = Keypair::generate().unwrap();
        let mut chain = Blockchain::new(funded_genesis(&[(&alice, 100)]), fast_consensus());
        let transfer = Transaction::new_transfer_at(&alice, "bob", 40, 1);

        let block = mine_on(&chain, &[transfer.clone()], "miner");
        chain.append(block.clone(), VerifyMode::Untrusted).unwrap();

        assert_eq!(chain.len(), 2);
        assert!(chain.contains_block(block.get_hash()));
        assert!(chain.contains_transaction(&transfer.get_id()));
        assert_eq!(chain.balance_of("bob"), 40);
        assert_eq!(chain.balance_of("miner"), 10);
        assert_eq!(chain.get_ledger(), &Ledger::rebuild_balances(chain.get_blocks()));
    }

    #[test]
    fn test_append_rejects_block_not_on_tip() {
        let mut chain = Blockchain::new(funded_genesis(&[]), fast_consensus());
        let first = mine_on(&chain, &[], "miner");
        chain.append(first.clone(), VerifyMode::Untrusted).unwrap();

        let stale = ProofOfWork::mine_block(&chain.get_blocks()[0], &[], "other", 1, 10).unwrap();
        assert!(matches!(
            chain.append(stale, VerifyMode::Untrusted),
            Err(BlockFault::BrokenLink { .. })
        ));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.get_tip_hash(), first.get_hash());
    }

    #[test]
    fn test_append_rejects_replayed_transfer() {
        let alice = Keypair::generate().unwrap();
        let mut chain = Blockchain::new(funded_genesis(&[(&alice, 100)]), fast_consensus());
        let transfer = Transaction::new_transfer_at(&alice, "bob", 40, 1);

        let block = mine_on(&chain, &[transfer.clone()], "miner");
        chain.append(block, VerifyMode::Trusted).unwrap();

        for mode in [VerifyMode::Trusted, VerifyMode::Untrusted] {
            let replay = mine_on(&chain, &[transfer.clone()], "miner");
            assert!(matches!(
                chain.append(replay, mode),
                Err(BlockFault::ReplayedTransaction { index: 1, .. })
            ));
        }
        assert_eq!(chain.balance_of("bob"), 40);
    }

    #[test]
    fn test_replace_rebuilds_everything() {
        let alice = Keypair::generate().unwrap();
        let genesis = funded_genesis(&[(&alice, 100)]);
        let mut local = Blockchain::new(genesis.clone(), fast_consensus());
        let mut remote = Blockchain::new(genesis, fast_consensus());

        let transfer = Transaction::new_transfer_at(&alice, "carol", 25, 1);
        let block = mine_on(&remote, &[transfer.clone()], "remote-miner");
        remote.append(block, VerifyMode::Untrusted).unwrap();
        let block = mine_on(&remote, &[], "remote-miner");
        remote.append(block, VerifyMode::Untrusted).unwrap();

        let validated = local
            .get_validator()
            .validate(remote.get_blocks().to_vec())
            .unwrap();
        local.replace(validated);

        assert_eq!(local.len(), 3);
        assert_eq!(local.get_tip_hash(), remote.get_tip_hash());
        assert_eq!(local.balance_of("carol"), 25);
        assert_eq!(local.balance_of("remote-miner"), 20);
        assert!(local.contains_transaction(&transfer.get_id()));
    }
}
