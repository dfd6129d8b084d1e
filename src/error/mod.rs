//! Error handling for the ledger node
//!
//! Every fallible operation in the crate returns [`Result`]. Consensus
//! rejections carry their typed reason so callers can tell a double spend
//! from a broken signature without parsing strings.

use crate::core::validator::{BlockFault, ChainFault};
use crate::storage::memory_pool::TxRejection;
use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

#[derive(Debug, Clone)]
pub enum BlockchainError {
    /// A submitted transaction failed mempool admission
    RejectedTransaction(TxRejection),
    /// A single block failed validation against the local tip
    InvalidBlock(BlockFault),
    /// A whole chain (peer candidate or persisted snapshot) failed validation
    InvalidChain(ChainFault),
    /// Snapshot load/persist errors
    Storage(String),
    /// Key handling and signing errors
    Crypto(String),
    /// Peer communication errors
    Network(String),
    /// Encoding/decoding errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Configuration errors
    Config(String),
    /// Mining worker errors
    Mining(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::RejectedTransaction(reason) => {
                write!(f, "Transaction rejected: {reason}")
            }
            BlockchainError::InvalidBlock(fault) => write!(f, "Invalid block: {fault}"),
            BlockchainError::InvalidChain(fault) => write!(f, "Invalid chain: {fault}"),
            BlockchainError::Storage(msg) => write!(f, "Storage error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Mining(msg) => write!(f, "Mining error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<TxRejection> for BlockchainError {
    fn from(reason: TxRejection) -> Self {
        BlockchainError::RejectedTransaction(reason)
    }
}

impl From<BlockFault> for BlockchainError {
    fn from(fault: BlockFault) -> Self {
        BlockchainError::InvalidBlock(fault)
    }
}

impl From<ChainFault> for BlockchainError {
    fn from(fault: ChainFault) -> Self {
        BlockchainError::InvalidChain(fault)
    }
}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}
