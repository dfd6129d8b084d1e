//! Longest-valid-chain selection
//!
//! Candidates are compared by length first and only validated when they
//! would actually win, so a flood of short or equal chains costs nothing.
//! Among candidates of the same winning length the first valid one is kept.

use crate::core::validator::ChainFault;
use crate::core::{Block, ChainValidator, ValidatedChain};
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct Synchronizer {
    validator: ChainValidator,
}

impl Synchronizer {
    pub fn new(validator: ChainValidator) -> Self {
        Synchronizer { validator }
    }

    /// Pick the longest fully valid candidate strictly longer than the local
    /// chain.
    ///
    /// Candidates must start from the local genesis block. Returns `None`
    /// when the local chain should be kept.
    pub fn select_longest_valid(
        &self,
        local_genesis: &str,
        local_len: usize,
        candidates: Vec<Vec<Block>>,
    ) -> Option<ValidatedChain> {
        let mut best_len = local_len;
        let mut best: Option<ValidatedChain> = None;

        for (index, candidate) in candidates.into_iter().enumerate() {
            if candidate.len() <= best_len {
                debug!(
                    "Skipping candidate {index}: length {} does not beat {best_len}",
                    candidate.len()
                );
                continue;
            }

            match self.check_candidate(local_genesis, candidate) {
                Ok(chain) => {
                    info!("Candidate {index} of length {} is the best so far", chain.len());
                    best_len = chain.len();
                    best = Some(chain);
                }
                Err(fault) => warn!("Discarding candidate chain {index}: {fault}"),
            }
        }
        best
    }

    fn check_candidate(
        &self,
        local_genesis: &str,
        candidate: Vec<Block>,
    ) -> Result<ValidatedChain, ChainFault> {
        if let Some(genesis) = candidate.first() {
            if genesis.get_hash() != local_genesis {
                return Err(ChainFault::ForeignGenesis {
                    expected: local_genesis.to_string(),
                    found: genesis.get_hash().to_string(),
                });
            }
        }
        self.validator.validate(candidate)
    }
}
