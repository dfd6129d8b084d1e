use crate::core::Transaction;
use crate::utils::sha256_hex;

/// Merkle root of an empty transaction list
pub const EMPTY_MERKLE_ROOT: &str = "0";

/// Merkle tree over a block's transactions.
///
/// Leaves are the hex SHA-256 of each transaction's canonical encoding.
/// Each parent is the hash of its two children's hex strings concatenated,
/// and an odd node at the end of a level is paired with itself.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<String>>,
}

impl MerkleTree {
    pub fn new(transactions: &[Transaction]) -> Self {
        let leaves = transactions
            .iter()
            .map(|tx| sha256_hex(&tx.canonical_bytes()))
            .collect();
        Self::from_leaves(leaves)
    }

    fn from_leaves(leaves: Vec<String>) -> Self {
        let mut levels = vec![leaves];
        while let Some(level) = levels.last() {
            if level.len() <= 1 {
                break;
            }
            let next = level
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    let right = pair.get(1).unwrap_or(left);
                    Self::hash_pair(left, right)
                })
                .collect();
            levels.push(next);
        }
        MerkleTree { levels }
    }

    /// Root hash, or [`EMPTY_MERKLE_ROOT`] for a tree without leaves
    pub fn root(&self) -> String {
        self.levels
            .last()
            .and_then(|level| level.first())
            .cloned()
            .unwrap_or_else(|| EMPTY_MERKLE_ROOT.to_string())
    }

    pub fn calculate_merkle_root(transactions: &[Transaction]) -> String {
        Self::new(transactions).root()
    }

    fn hash_pair(left: &str, right: &str) -> String {
        let mut combined = String::with_capacity(left.len() + right.len());
        combined.push_str(left);
        combined.push_str(right);
        sha256_hex(combined.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward(recipient: &str) -> Transaction {
        Transaction::new_reward(recipient, 10, 1_000)
    }

    fn leaf(tx: &Transaction) -> String {
        sha256_hex(&tx.canonical_bytes())
    }

    #[test]
    fn test_empty_transaction_list() {
        assert_eq!(MerkleTree::calculate_merkle_root(&[]), EMPTY_MERKLE_ROOT);
    }

    #[test]
    fn test_single_transaction_merkle_root() {
        let tx = reward("a");
        assert_eq!(MerkleTree::calculate_merkle_root(&[tx.clone()]), leaf(&tx));
    }

    #[test]
    fn test_pair_hashes_concatenated_hex() {
        let a = reward("a");
        let b = reward("b");
        let expected = sha256_hex(format!("{}{}", leaf(&a), leaf(&b)).as_bytes());
        assert_eq!(MerkleTree::calculate_merkle_root(&[a, b]), expected);
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        let a = reward("a");
        let b = reward("b");
        let c = reward("c");

        let ab = sha256_hex(format!("{}{}", leaf(&a), leaf(&b)).as_bytes());
        let cc = sha256_hex(format!("{}{}", leaf(&c), leaf(&c)).as_bytes());
        let expected = sha256_hex(format!("{ab}{cc}").as_bytes());

        assert_eq!(MerkleTree::calculate_merkle_root(&[a, b, c]), expected);
    }

    #[test]
    fn test_order_matters() {
        let a = reward("a");
        let b = reward("b");
        assert_ne!(
            MerkleTree::calculate_merkle_root(&[a.clone(), b.clone()]),
            MerkleTree::calculate_merkle_root(&[b, a])
        );
    }
}
