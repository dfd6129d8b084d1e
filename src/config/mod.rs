//! Configuration management
//!
//! Node, consensus and genesis settings. A TOML file supplies the base and
//! environment variables override the node identity fields.

pub mod settings;

pub use settings::{Config, ConsensusConfig, GenesisAllocation, GenesisConfig, NodeConfig};
