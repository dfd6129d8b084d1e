// Transactions move value between accounts. A transfer is signed with the
// sender's Ed25519 key and the sender field *is* that public key in hex, so
// verification needs nothing but the transaction itself.
// Mining rewards come from the reserved COINBASE sender and carry no signature.

use crate::error::Result;
use crate::utils::{
    current_timestamp, deserialize, ed25519_verify_hex, serialize, sha256_hex, Keypair,
};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Sender of every minted amount (block rewards and genesis allocations).
/// It is never debited and can never be submitted to a mempool.
pub const REWARD_SENDER: &str = "COINBASE";

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    sender: String,
    recipient: String,
    amount: u64,
    timestamp: i64, // Unix milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

impl Transaction {
    /// Build and sign a transfer stamped with the current time
    pub fn new_transfer(keypair: &Keypair, recipient: &str, amount: u64) -> Result<Transaction> {
        Ok(Self::new_transfer_at(
            keypair,
            recipient,
            amount,
            current_timestamp()?,
        ))
    }

    pub fn new_transfer_at(
        keypair: &Keypair,
        recipient: &str,
        amount: u64,
        timestamp: i64,
    ) -> Transaction {
        let mut tx = Transaction {
            sender: keypair.public_key_hex(),
            recipient: recipient.to_string(),
            amount,
            timestamp,
            signature: None,
        };
        let signature = keypair.sign(&tx.signing_payload());
        tx.signature = Some(HEXLOWER.encode(&signature));
        tx
    }

    /// Unsigned transaction minting `amount` to `recipient`
    pub fn new_reward(recipient: &str, amount: u64, timestamp: i64) -> Transaction {
        Transaction {
            sender: REWARD_SENDER.to_string(),
            recipient: recipient.to_string(),
            amount,
            timestamp,
            signature: None,
        }
    }

    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_SENDER
    }

    /// Canonical JSON value with keys in sorted order. `serde_json::Map` keeps
    /// keys ordered, and they are written here in that order as well.
    pub(crate) fn canonical_value(&self, with_signature: bool) -> Value {
        match (&self.signature, with_signature) {
            (Some(signature), true) => json!({
                "amount": self.amount,
                "recipient": self.recipient,
                "sender": self.sender,
                "signature": signature,
                "timestamp": self.timestamp,
            }),
            _ => json!({
                "amount": self.amount,
                "recipient": self.recipient,
                "sender": self.sender,
                "timestamp": self.timestamp,
            }),
        }
    }

    /// Bytes covered by the signature (canonical form without `signature`)
    pub fn signing_payload(&self) -> Vec<u8> {
        self.canonical_value(false).to_string().into_bytes()
    }

    /// Full canonical encoding, signature included
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.canonical_value(true).to_string().into_bytes()
    }

    /// Hex SHA-256 of the canonical encoding. Two transactions with the same
    /// id are the same transaction.
    pub fn get_id(&self) -> String {
        sha256_hex(&self.canonical_bytes())
    }

    /// Signature check only. Fails closed on a missing or malformed
    /// signature or sender key.
    pub fn verify_signature(&self) -> bool {
        match &self.signature {
            Some(signature) => {
                ed25519_verify_hex(&self.sender, signature, &self.signing_payload())
            }
            None => false,
        }
    }

    /// Stateless validity: positive amount, plus a good signature unless this
    /// is a reward.
    pub fn verify(&self) -> bool {
        if self.amount == 0 {
            return false;
        }
        self.is_reward() || self.verify_signature()
    }

    pub fn get_sender(&self) -> &str {
        self.sender.as_str()
    }

    pub fn get_recipient(&self) -> &str {
        self.recipient.as_str()
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }
}
