use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};

use crate::error::{BlockchainError, Result};
use data_encoding::HEXLOWER;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

const ED25519_PUBLIC_KEY_LEN: usize = 32;
const ED25519_SIGNATURE_LEN: usize = 64;

pub fn current_timestamp() -> Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Crypto(format!("System time error: {e}")))?
        .as_millis();

    // Ensure the timestamp fits in i64
    if duration > i64::MAX as u128 {
        return Err(BlockchainError::Crypto("Timestamp overflow".to_string()));
    }

    Ok(duration as i64)
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

/// Lowercase hex SHA-256, the form every hash in the ledger is stored in
pub fn sha256_hex(data: &[u8]) -> String {
    HEXLOWER.encode(sha256_digest(data).as_slice())
}

/// Ed25519 signing key. The public half, hex encoded, is the sender identity
/// of every transaction it signs.
pub struct Keypair {
    pkcs8: Vec<u8>,
    inner: Ed25519KeyPair,
}

impl Keypair {
    pub fn generate() -> Result<Keypair> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|e| BlockchainError::Crypto(format!("Failed to generate Ed25519 key: {e}")))?
            .as_ref()
            .to_vec();
        Self::from_pkcs8(&pkcs8)
    }

    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Keypair> {
        let inner = Ed25519KeyPair::from_pkcs8(pkcs8).map_err(|e| {
            BlockchainError::Crypto(format!("Failed to load key pair from PKCS8: {e}"))
        })?;
        Ok(Keypair {
            pkcs8: pkcs8.to_vec(),
            inner,
        })
    }

    pub fn from_pkcs8_hex(encoded: &str) -> Result<Keypair> {
        let pkcs8 = HEXLOWER
            .decode(encoded.trim().as_bytes())
            .map_err(|e| BlockchainError::Crypto(format!("Invalid key encoding: {e}")))?;
        Self::from_pkcs8(&pkcs8)
    }

    pub fn to_pkcs8_hex(&self) -> String {
        HEXLOWER.encode(&self.pkcs8)
    }

    pub fn public_key_hex(&self) -> String {
        HEXLOWER.encode(self.inner.public_key().as_ref())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.inner.sign(message).as_ref().to_vec()
    }
}

// Only the public half is ever printed
impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Verify a hex signature against a hex public key. Any decoding problem
/// counts as a failed verification.
pub fn ed25519_verify_hex(public_key_hex: &str, signature_hex: &str, message: &[u8]) -> bool {
    let public_key = match HEXLOWER.decode(public_key_hex.as_bytes()) {
        Ok(key) if key.len() == ED25519_PUBLIC_KEY_LEN => key,
        _ => return false,
    };
    let signature = match HEXLOWER.decode(signature_hex.as_bytes()) {
        Ok(sig) if sig.len() == ED25519_SIGNATURE_LEN => sig,
        _ => return false,
    };
    UnparsedPublicKey::new(&ED25519, public_key)
        .verify(message, &signature)
        .is_ok()
}
