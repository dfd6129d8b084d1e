//! Block and chain validation
//!
//! Everything that arrives from outside the node (peer blocks, peer chains,
//! persisted snapshots) goes through here in [`VerifyMode::Untrusted`].
//! Blocks this node mined itself from already-admitted mempool entries may
//! skip the per-transaction checks with [`VerifyMode::Trusted`].

use crate::core::block::GENESIS_PREVIOUS_HASH;
use crate::core::{Block, ProofOfWork};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Structure, linkage and proof-of-work only
    Trusted,
    /// Additionally every transaction and the reward layout
    Untrusted,
}

/// Why a single block was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockFault {
    MerkleRootMismatch { expected: String, found: String },
    HashMismatch { expected: String, found: String },
    BrokenLink { expected: String, found: String },
    InsufficientWork { difficulty: u32, hash: String },
    HeightMismatch { expected: u64, found: u64 },
    DifficultyBelowMinimum { difficulty: u32, minimum: u32 },
    InvalidTransaction { index: usize, id: String },
    MissingReward,
    MisplacedReward { index: usize },
    WrongReward { expected: u64, found: u64 },
    ReplayedTransaction { index: usize, id: String },
}

impl fmt::Display for BlockFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockFault::MerkleRootMismatch { expected, found } => {
                write!(f, "merkle root {found} does not match transactions ({expected})")
            }
            BlockFault::HashMismatch { expected, found } => {
                write!(f, "hash {found} does not match contents ({expected})")
            }
            BlockFault::BrokenLink { expected, found } => {
                write!(f, "previous hash {found} does not link to {expected}")
            }
            BlockFault::InsufficientWork { difficulty, hash } => {
                write!(f, "hash {hash} does not meet difficulty {difficulty}")
            }
            BlockFault::HeightMismatch { expected, found } => {
                write!(f, "height {found}, expected {expected}")
            }
            BlockFault::DifficultyBelowMinimum {
                difficulty,
                minimum,
            } => write!(f, "difficulty {difficulty} below minimum {minimum}"),
            BlockFault::InvalidTransaction { index, id } => {
                write!(f, "transaction {index} ({id}) is invalid")
            }
            BlockFault::MissingReward => write!(f, "first transaction is not a reward"),
            BlockFault::MisplacedReward { index } => {
                write!(f, "reward transaction at position {index}")
            }
            BlockFault::WrongReward { expected, found } => {
                write!(f, "reward of {found}, expected {expected}")
            }
            BlockFault::ReplayedTransaction { index, id } => {
                write!(f, "transaction {index} ({id}) was already confirmed")
            }
        }
    }
}

/// Why a whole chain was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainFault {
    Empty,
    InvalidGenesis(BlockFault),
    ForeignGenesis { expected: String, found: String },
    InvalidBlock { height: usize, fault: BlockFault },
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFault::Empty => write!(f, "chain is empty"),
            ChainFault::InvalidGenesis(fault) => write!(f, "genesis block: {fault}"),
            ChainFault::ForeignGenesis { expected, found } => {
                write!(f, "genesis {found} differs from local genesis {expected}")
            }
            ChainFault::InvalidBlock { height, fault } => {
                write!(f, "block at height {height}: {fault}")
            }
        }
    }
}

/// A chain that passed untrusted validation. Only [`ChainValidator::validate`]
/// can build one, so holding one proves the check happened.
#[derive(Debug, Clone)]
pub struct ValidatedChain(Vec<Block>);

impl ValidatedChain {
    pub fn blocks(&self) -> &[Block] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChainValidator {
    min_difficulty: u32,
    block_reward: u64,
}

impl ChainValidator {
    pub fn new(min_difficulty: u32, block_reward: u64) -> Self {
        ChainValidator {
            min_difficulty,
            block_reward,
        }
    }

    /// Full validation of a chain starting at genesis. The first failing
    /// block is reported.
    pub fn validate_chain(&self, chain: &[Block], mode: VerifyMode) -> Result<(), ChainFault> {
        let genesis = chain.first().ok_or(ChainFault::Empty)?;
        self.validate_genesis(genesis, mode)
            .map_err(ChainFault::InvalidGenesis)?;

        let mut seen = HashSet::new();
        for (height, pair) in chain.windows(2).enumerate() {
            let block = &pair[1];
            let checked = self.validate_block(block, &pair[0], mode).and_then(|()| {
                if mode == VerifyMode::Untrusted {
                    Self::check_replays(block, &mut seen)
                } else {
                    Ok(())
                }
            });
            checked.map_err(|fault| ChainFault::InvalidBlock {
                height: height + 1,
                fault,
            })?;
        }
        Ok(())
    }

    /// A signed transfer may be confirmed only once per chain. Rewards are
    /// exempt: identical rewards are legitimately minted by a fast miner.
    pub fn check_replays(block: &Block, seen: &mut HashSet<String>) -> Result<(), BlockFault> {
        for (index, tx) in block.get_transactions().iter().enumerate() {
            if tx.is_reward() {
                continue;
            }
            let id = tx.get_id();
            if !seen.insert(id.clone()) {
                return Err(BlockFault::ReplayedTransaction { index, id });
            }
        }
        Ok(())
    }

    pub fn is_valid_chain(&self, chain: &[Block]) -> bool {
        self.validate_chain(chain, VerifyMode::Untrusted).is_ok()
    }

    /// Untrusted validation that hands back proof of success
    pub fn validate(&self, chain: Vec<Block>) -> Result<ValidatedChain, ChainFault> {
        self.validate_chain(&chain, VerifyMode::Untrusted)?;
        Ok(ValidatedChain(chain))
    }

    /// Genesis carries no proof-of-work, but its hash and merkle root must
    /// still match its contents so allocations cannot be rewritten.
    pub fn validate_genesis(&self, block: &Block, mode: VerifyMode) -> Result<(), BlockFault> {
        if block.get_height() != 0 {
            return Err(BlockFault::HeightMismatch {
                expected: 0,
                found: block.get_height(),
            });
        }
        if block.get_previous_hash() != GENESIS_PREVIOUS_HASH {
            return Err(BlockFault::BrokenLink {
                expected: GENESIS_PREVIOUS_HASH.to_string(),
                found: block.get_previous_hash().to_string(),
            });
        }
        Self::check_contents(block)?;

        if mode == VerifyMode::Untrusted {
            for (index, tx) in block.get_transactions().iter().enumerate() {
                if !tx.is_reward() || !tx.verify() {
                    return Err(BlockFault::InvalidTransaction {
                        index,
                        id: tx.get_id(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate `block` as the direct successor of `previous`
    pub fn validate_block(
        &self,
        block: &Block,
        previous: &Block,
        mode: VerifyMode,
    ) -> Result<(), BlockFault> {
        Self::check_contents(block)?;

        if block.get_previous_hash() != previous.get_hash() {
            return Err(BlockFault::BrokenLink {
                expected: previous.get_hash().to_string(),
                found: block.get_previous_hash().to_string(),
            });
        }
        if !ProofOfWork::validate(block) {
            return Err(BlockFault::InsufficientWork {
                difficulty: block.get_difficulty(),
                hash: block.get_hash().to_string(),
            });
        }
        if block.get_height() != previous.get_height() + 1 {
            return Err(BlockFault::HeightMismatch {
                expected: previous.get_height() + 1,
                found: block.get_height(),
            });
        }
        if block.get_difficulty() < self.min_difficulty {
            return Err(BlockFault::DifficultyBelowMinimum {
                difficulty: block.get_difficulty(),
                minimum: self.min_difficulty,
            });
        }

        if mode == VerifyMode::Untrusted {
            self.check_transactions(block)?;
        }
        Ok(())
    }

    fn check_contents(block: &Block) -> Result<(), BlockFault> {
        if !block.verify_merkle_root() {
            return Err(BlockFault::MerkleRootMismatch {
                expected: crate::core::MerkleTree::calculate_merkle_root(block.get_transactions()),
                found: block.get_merkle_root().to_string(),
            });
        }
        let expected = block.calculate_hash();
        if expected != block.get_hash() {
            return Err(BlockFault::HashMismatch {
                expected,
                found: block.get_hash().to_string(),
            });
        }
        Ok(())
    }

    fn check_transactions(&self, block: &Block) -> Result<(), BlockFault> {
        let transactions = block.get_transactions();
        let reward = transactions.first().ok_or(BlockFault::MissingReward)?;
        if !reward.is_reward() {
            return Err(BlockFault::MissingReward);
        }
        if reward.get_amount() != self.block_reward {
            return Err(BlockFault::WrongReward {
                expected: self.block_reward,
                found: reward.get_amount(),
            });
        }

        for (index, tx) in transactions.iter().enumerate().skip(1) {
            if tx.is_reward() {
                return Err(BlockFault::MisplacedReward { index });
            }
            if !tx.verify() {
                return Err(BlockFault::InvalidTransaction {
                    index,
                    id: tx.get_id(),
                });
            }
        }
        Ok(())
    }
}
