//! Data storage and persistence
//!
//! The pending-transaction pool and the snapshot store that lets a node
//! resume after a restart.

pub mod chain_store;
pub mod memory_pool;

pub use chain_store::{ChainSnapshot, SledStore, SnapshotStore};
pub use memory_pool::{Admission, MemoryPool, TxRejection};
