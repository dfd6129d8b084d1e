use crate::core::{Block, Ledger, Transaction};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Why a transaction was refused admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxRejection {
    /// Minting transactions only enter the chain through mining
    RewardNotSubmittable,
    NonPositiveAmount,
    InvalidSignature,
    /// Confirmed balance minus everything already pending cannot cover it
    InsufficientFunds { available: i128, requested: u64 },
}

impl fmt::Display for TxRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxRejection::RewardNotSubmittable => {
                write!(f, "reward transactions cannot be submitted")
            }
            TxRejection::NonPositiveAmount => write!(f, "amount must be positive"),
            TxRejection::InvalidSignature => write!(f, "invalid signature"),
            TxRejection::InsufficientFunds {
                available,
                requested,
            } => write!(
                f,
                "double-spend in pending pool: {available} available, {requested} requested"
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// The identical transaction is already pending; nothing changed
    Duplicate,
}

/// Pending transactions in arrival order.
///
/// Invariant: for every sender, the pending outgoing total never exceeds the
/// confirmed balance of the ledger the pool was last checked against.
#[derive(Debug, Clone, Default)]
pub struct MemoryPool {
    entries: Vec<Transaction>,
    ids: HashSet<String>,
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool::default()
    }

    /// Admit `tx` against the confirmed balances in `ledger`. A rejected
    /// transaction leaves the pool untouched.
    pub fn submit(&mut self, tx: Transaction, ledger: &Ledger) -> Result<Admission, TxRejection> {
        let id = tx.get_id();
        if self.ids.contains(&id) {
            debug!("Transaction {id} already pending");
            return Ok(Admission::Duplicate);
        }
        self.check(&tx, ledger)?;

        self.ids.insert(id);
        self.entries.push(tx);
        Ok(Admission::Accepted)
    }

    /// Would `tx` be admitted right now? Same checks as [`submit`](Self::submit)
    /// without the side effect. Already-pending transactions count as accepted.
    pub fn accepts(&self, tx: &Transaction, ledger: &Ledger) -> bool {
        self.ids.contains(&tx.get_id()) || self.check(tx, ledger).is_ok()
    }

    fn check(&self, tx: &Transaction, ledger: &Ledger) -> Result<(), TxRejection> {
        if tx.is_reward() {
            return Err(TxRejection::RewardNotSubmittable);
        }
        if tx.get_amount() == 0 {
            return Err(TxRejection::NonPositiveAmount);
        }
        if !tx.verify_signature() {
            return Err(TxRejection::InvalidSignature);
        }

        let available =
            ledger.balance_of(tx.get_sender()) - self.pending_outgoing(tx.get_sender()) as i128;
        if available < i128::from(tx.get_amount()) {
            return Err(TxRejection::InsufficientFunds {
                available,
                requested: tx.get_amount(),
            });
        }
        Ok(())
    }

    /// Sum of pending amounts sent by `sender`
    pub fn pending_outgoing(&self, sender: &str) -> u128 {
        self.entries
            .iter()
            .filter(|tx| tx.get_sender() == sender)
            .map(|tx| u128::from(tx.get_amount()))
            .sum()
    }

    /// Drop every pending transaction that `block` includes
    pub fn remove_included(&mut self, block: &Block) {
        let included: HashSet<String> = block
            .get_transactions()
            .iter()
            .map(|tx| tx.get_id())
            .collect();
        let before = self.entries.len();
        self.retain(|_, id| !included.contains(id));
        debug!(
            "Removed {} pending transactions included in block {}",
            before - self.entries.len(),
            block.get_hash()
        );
    }

    /// Re-check every entry, in order, against a new ledger. Entries that
    /// are confirmed or no longer affordable are dropped; survivors keep
    /// their relative order. Returns how many were dropped.
    pub fn revalidate<F>(&mut self, ledger: &Ledger, is_confirmed: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let before = self.entries.len();
        let mut committed: HashMap<String, u128> = HashMap::new();

        self.retain(|tx, id| {
            if is_confirmed(id) {
                return false;
            }
            let spent = committed.entry(tx.get_sender().to_string()).or_insert(0);
            let available = ledger.balance_of(tx.get_sender()) - *spent as i128;
            if available < i128::from(tx.get_amount()) {
                info!("Dropping pending transaction {id}: no longer affordable");
                return false;
            }
            *spent += u128::from(tx.get_amount());
            true
        });
        before - self.entries.len()
    }

    fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Transaction, &str) -> bool,
    {
        let entries = std::mem::take(&mut self.entries);
        self.ids.clear();
        for tx in entries {
            let id = tx.get_id();
            if keep(&tx, id.as_str()) {
                self.ids.insert(id);
                self.entries.push(tx);
            }
        }
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.ids.contains(tx_id)
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
