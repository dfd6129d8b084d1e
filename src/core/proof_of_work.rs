use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::current_timestamp;
use log::{debug, info};

/// How often (in nonces) a cancellable search checks whether to stop
pub const DEFAULT_POLL_INTERVAL: u64 = 1024;

/// Nonce search over a candidate block.
///
/// The target is textual: a hash satisfies difficulty `d` when its first `d`
/// hex characters are all `'0'`.
pub struct ProofOfWork {
    block: Block,
    difficulty: u32,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block) -> ProofOfWork {
        let difficulty = block.get_difficulty();
        ProofOfWork { block, difficulty }
    }

    /// Check that the stored hash meets the block's own difficulty
    pub fn validate(block: &Block) -> bool {
        meets_difficulty(block.get_hash(), block.get_difficulty())
    }

    /// Assemble a block on top of `previous` and search until the target is
    /// met. The reward transaction goes first, pending transactions follow in
    /// the order given.
    pub fn mine_block(
        previous: &Block,
        pending: &[Transaction],
        miner_id: &str,
        difficulty: u32,
        reward: u64,
    ) -> Result<Block> {
        let candidate =
            Self::prepare_candidate(previous, pending, miner_id, difficulty, reward)?;
        ProofOfWork::new_proof_of_work(candidate)
            .run(DEFAULT_POLL_INTERVAL, |_| false)
            .ok_or_else(|| BlockchainError::Mining("Nonce space exhausted".to_string()))
    }

    pub fn prepare_candidate(
        previous: &Block,
        pending: &[Transaction],
        miner_id: &str,
        difficulty: u32,
        reward: u64,
    ) -> Result<Block> {
        let timestamp = current_timestamp()?;
        let mut transactions = Vec::with_capacity(pending.len() + 1);
        transactions.push(Transaction::new_reward(miner_id, reward, timestamp));
        transactions.extend_from_slice(pending);
        Ok(Block::new_candidate(
            previous,
            transactions,
            difficulty,
            miner_id,
            timestamp,
        ))
    }

    /// Search nonces from zero. Every `poll_interval` nonces `should_stop` is
    /// asked whether the work is still wanted; a `true` answer abandons the
    /// search and returns `None`.
    pub fn run<F>(self, poll_interval: u64, mut should_stop: F) -> Option<Block>
    where
        F: FnMut(u64) -> bool,
    {
        let poll_interval = poll_interval.max(1);
        let mut block = self.block;
        let mut nonce: u64 = 0;
        info!(
            "Mining block at height {} with difficulty {}",
            block.get_height(),
            self.difficulty
        );
        loop {
            if nonce % poll_interval == 0 && should_stop(nonce) {
                debug!("Abandoning search at nonce {nonce}");
                return None;
            }
            block.seal(nonce);
            if meets_difficulty(block.get_hash(), self.difficulty) {
                info!("Proof-of-work completed for block: {}", block.get_hash());
                return Some(block);
            }
            nonce = nonce.checked_add(1)?;
        }
    }
}

pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let required = difficulty as usize;
    hash.len() >= required && hash.bytes().take(required).all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::GENESIS_PREVIOUS_HASH;

    fn genesis() -> Block {
        Block::generate_genesis_block(0, vec![])
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("0ab0", 2));
        assert!(meets_difficulty("abcd", 0));
        assert!(!meets_difficulty("0", 2));
    }

    #[test]
    fn test_mined_block_meets_target() {
        let parent = genesis();
        let block = ProofOfWork::mine_block(&parent, &[], "miner", 2, 10).unwrap();

        assert!(ProofOfWork::validate(&block));
        assert!(block.get_hash().starts_with("00"));
        assert_eq!(block.get_hash(), block.calculate_hash());
        assert_eq!(block.get_previous_hash(), parent.get_hash());
        assert_ne!(block.get_previous_hash(), GENESIS_PREVIOUS_HASH);
    }

    #[test]
    fn test_reward_goes_first() {
        let alice = crate::utils::Keypair::generate().unwrap();
        let transfer = Transaction::new_transfer_at(&alice, "bob", 3, 1);

        let block = ProofOfWork::mine_block(&genesis(), &[transfer.clone()], "miner", 1, 10)
            .unwrap();
        let txs = block.get_transactions();

        assert_eq!(txs.len(), 2);
        assert!(txs[0].is_reward());
        assert_eq!(txs[0].get_recipient(), "miner");
        assert_eq!(txs[0].get_amount(), 10);
        assert_eq!(txs[1], transfer);
        assert_eq!(block.get_mined_by(), "miner");
    }

    #[test]
    fn test_run_can_be_abandoned() {
        let candidate = ProofOfWork::prepare_candidate(&genesis(), &[], "miner", 64, 10).unwrap();
        let mut polls = 0;
        let result = ProofOfWork::new_proof_of_work(candidate).run(16, |_| {
            polls += 1;
            polls > 3
        });
        assert!(result.is_none());
        assert_eq!(polls, 4);
    }
}
