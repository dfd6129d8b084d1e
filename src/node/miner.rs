// Proof-of-work runs on its own thread so the node lock is never held while
// searching. The worker stops early when the tip it is building on changes
// or the node shuts down, and reports back over a channel either way.

use crate::core::{Block, ProofOfWork};
use crate::error::{BlockchainError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningOutcome {
    Found(Block),
    /// The tip moved or the node is shutting down
    Abandoned,
}

/// Start searching for a nonce for `candidate` on a worker thread.
///
/// `tip` mirrors the node's current tip hash; once it no longer matches the
/// candidate's previous hash the search is abandoned.
pub fn spawn_search(
    candidate: Block,
    tip: Arc<RwLock<String>>,
    shutdown: Arc<AtomicBool>,
    poll_interval: u64,
) -> Result<Receiver<MiningOutcome>> {
    let (sender, receiver) = mpsc::channel();
    let previous_hash = candidate.get_previous_hash().to_string();

    thread::Builder::new()
        .name(format!("miner-{}", candidate.get_height()))
        .spawn(move || {
            let is_stale = |_nonce: u64| {
                shutdown.load(Ordering::SeqCst)
                    || *tip.read().unwrap_or_else(PoisonError::into_inner) != previous_hash
            };
            let pow = ProofOfWork::new_proof_of_work(candidate);
            let outcome = match pow.run(poll_interval, is_stale) {
                Some(block) => MiningOutcome::Found(block),
                None => MiningOutcome::Abandoned,
            };
            // The receiver only goes away if the node stopped waiting
            let _ = sender.send(outcome);
        })
        .map_err(|e| BlockchainError::Mining(format!("Failed to spawn miner thread: {e}")))?;

    Ok(receiver)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(difficulty: u32) -> Block {
        let genesis = Block::generate_genesis_block(0, vec![]);
        ProofOfWork::prepare_candidate(&genesis, &[], "miner", difficulty, 10).unwrap()
    }

    #[test]
    fn test_worker_finds_block() {
        let block = candidate(1);
        let tip = Arc::new(RwLock::new(block.get_previous_hash().to_string()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let receiver = spawn_search(block, tip, shutdown, 64).unwrap();
        match receiver.recv().unwrap() {
            MiningOutcome::Found(block) => assert!(ProofOfWork::validate(&block)),
            MiningOutcome::Abandoned => panic!("search should not be abandoned"),
        }
    }

    #[test]
    fn test_worker_abandons_on_stale_tip() {
        let block = candidate(64);
        let tip = Arc::new(RwLock::new("some-other-tip".to_string()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let receiver = spawn_search(block, tip, shutdown, 8).unwrap();
        assert_eq!(receiver.recv().unwrap(), MiningOutcome::Abandoned);
    }

    #[test]
    fn test_worker_abandons_on_shutdown() {
        let block = candidate(64);
        let tip = Arc::new(RwLock::new(block.get_previous_hash().to_string()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let receiver = spawn_search(block, Arc::clone(&tip), Arc::clone(&shutdown), 8).unwrap();
        shutdown.store(true, Ordering::SeqCst);
        assert_eq!(receiver.recv().unwrap(), MiningOutcome::Abandoned);
    }
}
