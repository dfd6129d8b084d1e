//! Utility functions and helpers
//!
//! Hashing, Ed25519 signing, timestamps and the bincode wrappers used for
//! on-disk snapshots.

pub mod crypto;
pub mod serialization;

pub use crypto::{current_timestamp, ed25519_verify_hex, sha256_digest, sha256_hex, Keypair};

pub use serialization::{deserialize, serialize};
