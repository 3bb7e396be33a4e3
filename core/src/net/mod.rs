//! Peer channel implementations
//!
//! Two [`crate::session::PeerConnector`]s:
//!
//! - `iroh`: the production connector. QUIC with built-in NAT traversal
//!   and relay fallback; the connection metadata exchanged through the
//!   rendezvous is the endpoint id plus an optional relay URL.
//! - `memory`: an in-process switchboard for tests - real channel
//!   semantics, no sockets.

pub mod iroh;
pub mod memory;

pub use iroh::IrohConnector;
pub use memory::{MemoryConnector, MemoryHub};
