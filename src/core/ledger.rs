use crate::core::{Block, Transaction};
use std::collections::BTreeMap;

/// Account balances derived from a chain.
///
/// Balances are signed: replaying a chain that was only checked structurally
/// can drive an account below zero, and the ledger records that rather than
/// hiding it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    balances: BTreeMap<String, i128>,
}

impl Ledger {
    pub fn new() -> Ledger {
        Ledger::default()
    }

    /// Replay `chain` from genesis. This is the only authoritative source of
    /// balances; everything else is a cache of it.
    pub fn rebuild_balances(chain: &[Block]) -> Ledger {
        let mut ledger = Ledger::new();
        for block in chain {
            ledger.apply_block(block);
        }
        ledger
    }

    /// Incremental update for a block appended to the chain this ledger was
    /// built from
    pub fn apply_block(&mut self, block: &Block) {
        for tx in block.get_transactions() {
            self.apply_transaction(tx);
        }
    }

    fn apply_transaction(&mut self, tx: &Transaction) {
        let amount = i128::from(tx.get_amount());
        if !tx.is_reward() {
            *self.balances.entry(tx.get_sender().to_string()).or_insert(0) -= amount;
        }
        *self
            .balances
            .entry(tx.get_recipient().to_string())
            .or_insert(0) += amount;
    }

    pub fn balance_of(&self, account: &str) -> i128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn get_balances(&self) -> &BTreeMap<String, i128> {
        &self.balances
    }

    pub fn into_balances(self) -> BTreeMap<String, i128> {
        self.balances
    }
}
