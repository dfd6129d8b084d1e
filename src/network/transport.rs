use crate::core::{Block, Transaction};

/// Outbound side of peer communication.
///
/// Broadcasts are fire-and-forget: delivery failures are logged by the
/// implementation and never reported back to consensus code.
pub trait Transport: Send + Sync {
    fn broadcast_transaction(&self, tx: &Transaction, best_height: u64);
    fn broadcast_block(&self, block: &Block);
    /// Full chains of every reachable peer. Unreachable peers are skipped.
    fn fetch_peer_chains(&self) -> Vec<Vec<Block>>;
}

/// Transport for a node with no peers
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

impl Transport for NoopTransport {
    fn broadcast_transaction(&self, _tx: &Transaction, _best_height: u64) {}

    fn broadcast_block(&self, _block: &Block) {}

    fn fetch_peer_chains(&self) -> Vec<Vec<Block>> {
        Vec::new()
    }
}
