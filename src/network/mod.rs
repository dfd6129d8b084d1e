//! Peer-to-peer plumbing
//!
//! The node only sees the [`Transport`] trait. `server` implements it over
//! TCP with a JSON package stream; `local` wires several nodes together in
//! one process.

pub mod local;
pub mod peers;
pub mod server;
pub mod transport;

pub use local::{LocalNetwork, LocalTransport};
pub use peers::{Peer, Peers};
pub use server::{fetch_chain, send_tx, Package, Server, TcpTransport};
pub use transport::{NoopTransport, Transport};
