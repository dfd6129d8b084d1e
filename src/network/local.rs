// In-process transport. Every node on a LocalNetwork talks to the others by
// calling straight into them, which makes multi-node scenarios deterministic
// enough to test. Nodes can be split into partitions; a node only reaches
// peers in its own partition.

use crate::core::{Block, Transaction};
use crate::network::Transport;
use crate::node::Node;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

const DEFAULT_PARTITION: u32 = 0;

#[derive(Default)]
pub struct LocalNetwork {
    nodes: RwLock<Vec<(String, Weak<Node>)>>,
    partitions: RwLock<HashMap<String, u32>>,
}

impl LocalNetwork {
    pub fn new() -> Arc<LocalNetwork> {
        Arc::new(LocalNetwork::default())
    }

    /// Transport for the node that will register as `node_id`
    pub fn transport(self: &Arc<Self>, node_id: &str) -> Arc<LocalTransport> {
        Arc::new(LocalTransport {
            network: Arc::clone(self),
            node_id: node_id.to_string(),
        })
    }

    pub fn join(&self, node: &Arc<Node>) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.push((node.get_node_id().to_string(), Arc::downgrade(node)));
    }

    /// Move `node_id` into `partition`. Everyone starts in the same one.
    pub fn set_partition(&self, node_id: &str, partition: u32) {
        self.partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.to_string(), partition);
    }

    /// Put every node back into one partition
    pub fn heal(&self) {
        self.partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn partition_of(&self, node_id: &str) -> u32 {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node_id)
            .copied()
            .unwrap_or(DEFAULT_PARTITION)
    }

    /// Live nodes reachable from `node_id`, excluding itself
    fn peers_of(&self, node_id: &str) -> Vec<Arc<Node>> {
        let partition = self.partition_of(node_id);
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes
            .iter()
            .filter(|(id, _)| id != node_id && self.partition_of(id) == partition)
            .filter_map(|(_, node)| node.upgrade())
            .collect()
    }
}

pub struct LocalTransport {
    network: Arc<LocalNetwork>,
    node_id: String,
}

impl Transport for LocalTransport {
    fn broadcast_transaction(&self, tx: &Transaction, best_height: u64) {
        for peer in self.network.peers_of(&self.node_id) {
            if let Err(e) = peer.receive_transaction(tx.clone(), best_height) {
                debug!("{} refused transaction from {}: {e}", peer.get_node_id(), self.node_id);
            }
        }
    }

    fn broadcast_block(&self, block: &Block) {
        for peer in self.network.peers_of(&self.node_id) {
            if let Err(e) = peer.submit_block(block.clone()) {
                debug!("{} refused block from {}: {e}", peer.get_node_id(), self.node_id);
            }
        }
    }

    fn fetch_peer_chains(&self) -> Vec<Vec<Block>> {
        self.network
            .peers_of(&self.node_id)
            .iter()
            .map(|peer| peer.request_chain_snapshot())
            .collect()
    }
}
