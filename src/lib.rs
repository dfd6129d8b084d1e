//! # Architect Ledger - a multi-node proof-of-work account ledger
//!
//! Every node keeps a full chain of blocks, a pool of pending signed
//! transfers and the account balances derived by replaying the chain.
//! Nodes gossip transactions and blocks and converge on the longest valid
//! chain they can see.
//!
//! ## How the code is organized
//! - `core/`: blocks, transactions, merkle roots, proof-of-work, difficulty,
//!   validation, balance replay and longest-chain selection
//! - `storage/`: the mempool and the sled snapshot store
//! - `node/`: the node itself, which owns all state and runs the miner and
//!   sync workers
//! - `network/`: the `Transport` seam, the TCP server and an in-process
//!   network for simulations
//! - `config/`: TOML + environment configuration
//! - `utils/`: hashing, Ed25519 keys, timestamps and bincode helpers
//! - `cli/`: command-line parsing for the binary
//!
//! ## Where to start
//! 1. `node/mod.rs` for what happens when a transaction or block arrives
//! 2. `core/validator.rs` for what makes a block or chain valid
//! 3. `storage/memory_pool.rs` for how double spends are kept out

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod node;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, ConsensusConfig, GenesisAllocation, GenesisConfig, NodeConfig};
pub use core::{
    Block, BlockFault, Blockchain, ChainFault, ChainValidator, DifficultyAdjustment, Ledger,
    MerkleTree, ProofOfWork, Synchronizer, Transaction, ValidatedChain, VerifyMode,
    REWARD_SENDER,
};
pub use error::{BlockchainError, Result};
pub use network::{
    fetch_chain, send_tx, LocalNetwork, LocalTransport, NoopTransport, Peers, Server,
    TcpTransport, Transport,
};
pub use node::{BlockOutcome, MiningOutcome, Node, SyncOutcome, TxOutcome};
pub use storage::{Admission, ChainSnapshot, MemoryPool, SledStore, SnapshotStore, TxRejection};
pub use utils::{current_timestamp, sha256_digest, sha256_hex, Keypair};
