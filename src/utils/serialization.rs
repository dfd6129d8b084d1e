// Bincode 2.x wrappers for the on-disk snapshot format.
// Hashing never goes through here: block and transaction hashes are computed
// from their canonical JSON form (see core::transaction and core::block).
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

/// Serialize data using bincode 2.0 with standard configuration
pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize data using bincode 2.0 with standard configuration
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use std::collections::BTreeMap;

    #[test]
    fn test_transaction_survives_storage_encoding() {
        let tx = Transaction::new_reward("miner-1", 10, 1_700_000_000_000);

        let bytes = serialize(&tx).expect("Serialization should work");
        let restored: Transaction = deserialize(&bytes).expect("Deserialization should work");

        assert_eq!(tx, restored);
        assert_eq!(tx.get_id(), restored.get_id());
    }

    #[test]
    fn test_signed_balances_encoding() {
        let mut balances: BTreeMap<String, i128> = BTreeMap::new();
        balances.insert("alice".to_string(), 100);
        balances.insert("bob".to_string(), -5);

        let bytes = serialize(&balances).expect("Should serialize balances");
        let restored: BTreeMap<String, i128> =
            deserialize(&bytes).expect("Should deserialize balances");
        assert_eq!(balances, restored);
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let invalid_bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let result: Result<Transaction> = deserialize(&invalid_bytes);
        assert!(result.is_err());
    }
}
