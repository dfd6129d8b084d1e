use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::{Peers, Transport};
use crate::node::Node;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Deserializer;
use std::io::{self, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const NODE_VERSION: usize = 1;
const TCP_WRITE_TIMEOUT: u64 = 5000;
const TCP_READ_TIMEOUT: u64 = 60_000;
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Messages exchanged between nodes, written back to back as JSON values on a
/// TCP stream
#[derive(Debug, Serialize, Deserialize)]
pub enum Package {
    /// Handshake: registers the sender as a peer and announces its height
    Version {
        addr_from: String,
        version: usize,
        best_height: u64,
    },
    Tx {
        addr_from: String,
        best_height: u64,
        transaction: Transaction,
    },
    Block {
        addr_from: String,
        block: Block,
    },
    /// Ask for the full chain; answered with `Chain` on the same stream
    GetChain {
        addr_from: String,
    },
    Chain {
        blocks: Vec<Block>,
    },
}

/// TCP front end of a node
pub struct Server {
    node: Arc<Node>,
    peers: Arc<Peers>,
    node_addr: String,
}

impl Server {
    pub fn new(node: Arc<Node>, peers: Arc<Peers>, node_addr: &str) -> Self {
        Self {
            node,
            peers,
            node_addr: node_addr.to_string(),
        }
    }

    /// Listen on `node_addr`, announce ourselves to known peers and serve
    /// until the node shuts down
    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.node_addr).map_err(|e| {
            BlockchainError::Network(format!("Failed to bind to {}: {e}", self.node_addr))
        })?;
        info!("Server listening on {}", self.node_addr);

        self.connect_to_network();
        self.serve(listener)
    }

    fn connect_to_network(&self) {
        let best_height = self.node.best_height();
        for peer in self.peers.get_peers() {
            if peer.get_addr() == self.node_addr {
                continue;
            }
            if let Err(e) = send_version(&self.node_addr, peer.get_addr(), best_height) {
                warn!("Could not reach peer {}: {e}", peer.get_addr());
            }
        }
    }

    /// Accept loop. Each connection gets its own handler thread. The listener
    /// is polled so the loop ends soon after the node shuts down.
    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        listener.set_nonblocking(true).map_err(|e| {
            BlockchainError::Network(format!("Failed to configure listener: {e}"))
        })?;

        while !self.node.is_shutdown() {
            match listener.accept() {
                Ok((stream, peer_addr)) => {
                    // Handlers use blocking reads with timeouts
                    if let Err(e) = stream.set_nonblocking(false) {
                        error!("Failed to configure stream from {peer_addr}: {e}");
                        continue;
                    }

                    let node = Arc::clone(&self.node);
                    let peers = Arc::clone(&self.peers);
                    let node_addr = self.node_addr.clone();
                    thread::spawn(move || {
                        if let Err(e) =
                            Self::handle_connection(&node, &peers, &node_addr, stream, peer_addr)
                        {
                            error!("Error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
        info!("Server on {} stopped", self.node_addr);
        Ok(())
    }

    fn handle_connection(
        node: &Node,
        peers: &Peers,
        node_addr: &str,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_millis(TCP_READ_TIMEOUT)))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;

        let reader = BufReader::new(&stream);
        let pkg_reader = Deserializer::from_reader(reader).into_iter::<Package>();

        for pkg in pkg_reader {
            let pkg = pkg.map_err(|e| {
                BlockchainError::Network(format!("Failed to deserialize package: {e}"))
            })?;
            debug!("Received request from {peer_addr}: {pkg:?}");

            match pkg {
                Package::GetChain { addr_from } => {
                    debug!("Serving chain to {addr_from}");
                    let reply = Package::Chain {
                        blocks: node.request_chain_snapshot(),
                    };
                    write_package(&stream, &reply)?;
                }
                other => {
                    if let Err(e) = Self::process_message(node, peers, node_addr, other) {
                        warn!("Error processing message from {peer_addr}: {e}");
                    }
                }
            }
        }

        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }

    fn process_message(node: &Node, peers: &Peers, node_addr: &str, pkg: Package) -> Result<()> {
        match pkg {
            Package::Version {
                addr_from,
                version,
                best_height,
            } => {
                Self::handle_version_message(node, peers, node_addr, addr_from, version, best_height)
            }
            Package::Tx {
                addr_from,
                best_height,
                transaction,
            } => {
                let outcome = node.receive_transaction(transaction, best_height)?;
                debug!("Transaction from {addr_from}: {outcome:?}");
                Ok(())
            }
            Package::Block { addr_from, block } => {
                let outcome = node.submit_block(block)?;
                debug!("Block from {addr_from}: {outcome:?}");
                Ok(())
            }
            Package::GetChain { .. } => Ok(()),
            Package::Chain { .. } => {
                warn!("Ignoring unsolicited chain");
                Ok(())
            }
        }
    }

    fn handle_version_message(
        node: &Node,
        peers: &Peers,
        node_addr: &str,
        addr_from: String,
        version: usize,
        best_height: u64,
    ) -> Result<()> {
        if version != NODE_VERSION {
            peers.evict_peer(&addr_from);
            return Err(BlockchainError::Network(format!(
                "Peer {addr_from} speaks version {version}, expected {NODE_VERSION}"
            )));
        }
        if addr_from != node_addr && peers.add_peer(addr_from.clone()) {
            info!("Registered peer {addr_from}");
        }

        let local_best_height = node.best_height();
        if local_best_height < best_height {
            node.synchronize()?;
        } else if local_best_height > best_height {
            send_version(node_addr, &addr_from, local_best_height)?;
        }
        Ok(())
    }
}

/// `Transport` over TCP to every known peer
pub struct TcpTransport {
    node_addr: String,
    peers: Arc<Peers>,
}

impl TcpTransport {
    pub fn new(node_addr: &str, peers: Arc<Peers>) -> Self {
        TcpTransport {
            node_addr: node_addr.to_string(),
            peers,
        }
    }

    fn peer_addrs(&self) -> Vec<String> {
        self.peers
            .get_peers()
            .into_iter()
            .map(|p| p.get_addr().to_string())
            .filter(|addr| *addr != self.node_addr)
            .collect()
    }

    fn send_to_all(&self, pkg: &Package) {
        for addr in self.peer_addrs() {
            if let Err(e) = send_data(&addr, pkg) {
                error!("Failed to send to {addr}: {e}");
            }
        }
    }

    fn request_chain(&self, addr: &str) -> Result<Vec<Block>> {
        let stream = connect(addr)?;
        stream
            .set_read_timeout(Some(Duration::from_millis(TCP_READ_TIMEOUT)))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;
        write_package(
            &stream,
            &Package::GetChain {
                addr_from: self.node_addr.clone(),
            },
        )?;

        let mut replies = Deserializer::from_reader(BufReader::new(&stream)).into_iter::<Package>();
        match replies.next() {
            Some(Ok(Package::Chain { blocks })) => Ok(blocks),
            Some(Ok(other)) => Err(BlockchainError::Network(format!(
                "Unexpected reply from {addr}: {other:?}"
            ))),
            Some(Err(e)) => Err(BlockchainError::Network(format!(
                "Failed to read chain from {addr}: {e}"
            ))),
            None => Err(BlockchainError::Network(format!(
                "{addr} closed the connection without a chain"
            ))),
        }
    }
}

impl Transport for TcpTransport {
    fn broadcast_transaction(&self, tx: &Transaction, best_height: u64) {
        self.send_to_all(&Package::Tx {
            addr_from: self.node_addr.clone(),
            best_height,
            transaction: tx.clone(),
        });
    }

    fn broadcast_block(&self, block: &Block) {
        self.send_to_all(&Package::Block {
            addr_from: self.node_addr.clone(),
            block: block.clone(),
        });
    }

    fn fetch_peer_chains(&self) -> Vec<Vec<Block>> {
        let mut chains = Vec::new();
        for addr in self.peer_addrs() {
            match self.request_chain(&addr) {
                Ok(chain) => chains.push(chain),
                Err(e) => error!("Failed to fetch chain from {addr}: {e}"),
            }
        }
        chains
    }
}

/// Hand a transaction to the node at `addr`, as a client would
pub fn send_tx(addr: &str, tx: &Transaction) -> Result<()> {
    send_data(
        addr,
        &Package::Tx {
            addr_from: String::new(),
            best_height: 0,
            transaction: tx.clone(),
        },
    )
}

/// Fetch the chain of the node at `addr`
pub fn fetch_chain(addr: &str) -> Result<Vec<Block>> {
    TcpTransport::new("", Arc::new(Peers::new())).request_chain(addr)
}

fn send_version(node_addr: &str, addr: &str, best_height: u64) -> Result<()> {
    send_data(
        addr,
        &Package::Version {
            addr_from: node_addr.to_string(),
            version: NODE_VERSION,
            best_height,
        },
    )
}

fn connect(addr: &str) -> Result<TcpStream> {
    let socket_addr = addr
        .parse::<SocketAddr>()
        .map_err(|e| BlockchainError::Network(format!("Invalid address {addr}: {e}")))?;
    let stream =
        TcpStream::connect_timeout(&socket_addr, Duration::from_millis(TCP_WRITE_TIMEOUT))
            .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT)))
        .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;
    Ok(stream)
}

fn write_package(mut stream: &TcpStream, pkg: &Package) -> Result<()> {
    serde_json::to_writer(stream, pkg)
        .map_err(|e| BlockchainError::Network(format!("Failed to send data: {e}")))?;
    stream.flush()?;
    Ok(())
}

fn send_data(addr: &str, pkg: &Package) -> Result<()> {
    debug!("Sending package to {addr}: {pkg:?}");
    let stream = connect(addr)?;
    write_package(&stream, pkg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NoopTransport;
    use crate::testnet::funded_config;
    use crate::utils::Keypair;

    #[test]
    fn test_package_serialization() {
        let alice = Keypair::generate().unwrap();
        let tx = Transaction::new_transfer(&alice, "bob", 3).unwrap();
        let pkg = Package::Tx {
            addr_from: "127.0.0.1:2001".to_string(),
            best_height: 4,
            transaction: tx.clone(),
        };

        let serialized = serde_json::to_string(&pkg).unwrap();
        match serde_json::from_str::<Package>(&serialized).unwrap() {
            Package::Tx {
                best_height,
                transaction,
                ..
            } => {
                assert_eq!(best_height, 4);
                assert_eq!(transaction.get_id(), tx.get_id());
                assert!(transaction.verify());
            }
            other => panic!("unexpected package {other:?}"),
        }
    }

    #[test]
    fn test_packages_stream_back_to_back() {
        let first = serde_json::to_string(&Package::GetChain {
            addr_from: "a".to_string(),
        })
        .unwrap();
        let second = serde_json::to_string(&Package::Chain { blocks: vec![] }).unwrap();
        let wire = format!("{first}{second}");

        let packages: Vec<Package> = Deserializer::from_str(&wire)
            .into_iter::<Package>()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(packages.len(), 2);
        assert!(matches!(packages[1], Package::Chain { .. }));
    }

    #[test]
    fn test_chain_served_over_tcp() {
        let node = Node::new(funded_config(&[]), Arc::new(NoopTransport), None);
        node.mine_block("miner").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = Server::new(Arc::clone(&node), Arc::new(Peers::new()), &addr);
        thread::spawn(move || server.serve(listener));

        let chain = fetch_chain(&addr).unwrap();
        assert_eq!(chain, node.request_chain_snapshot());

        let peers = Arc::new(Peers::from_addrs(vec![addr.clone()]));
        let transport = TcpTransport::new("127.0.0.1:1", peers);
        assert_eq!(transport.fetch_peer_chains(), vec![chain]);
    }

    #[test]
    fn test_transaction_delivered_over_tcp() {
        let alice = Keypair::generate().unwrap();
        let node = Node::new(funded_config(&[(&alice, 50)]), Arc::new(NoopTransport), None);

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = Server::new(Arc::clone(&node), Arc::new(Peers::new()), &addr);
        thread::spawn(move || server.serve(listener));

        let tx = Transaction::new_transfer(&alice, "bob", 20).unwrap();
        send_tx(&addr, &tx).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while node.pending_transactions().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(node.pending_transactions(), vec![tx]);
    }

    #[test]
    fn test_serve_returns_after_shutdown() {
        let node = Node::new(funded_config(&[]), Arc::new(NoopTransport), None);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = Server::new(Arc::clone(&node), Arc::new(Peers::new()), &addr);
        let handle = thread::spawn(move || server.serve(listener));

        // Still serving until the node stops
        assert_eq!(fetch_chain(&addr).unwrap().len(), 1);
        node.shutdown();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(handle.is_finished());
        assert!(handle.join().unwrap().is_ok());
    }
}
