//! Core consensus functionality
//!
//! Blocks and transactions with their canonical hashing, proof-of-work,
//! difficulty adjustment, validation, the derived ledger and longest-chain
//! selection.

pub mod block;
pub mod blockchain;
pub mod difficulty;
pub mod ledger;
pub mod merkle;
pub mod proof_of_work;
pub mod sync;
pub mod transaction;
pub mod validator;

pub use block::Block;
pub use blockchain::Blockchain;
pub use difficulty::DifficultyAdjustment;
pub use ledger::Ledger;
pub use merkle::MerkleTree;
pub use proof_of_work::ProofOfWork;
pub use sync::Synchronizer;
pub use transaction::{Transaction, REWARD_SENDER};
pub use validator::{BlockFault, ChainFault, ChainValidator, ValidatedChain, VerifyMode};
