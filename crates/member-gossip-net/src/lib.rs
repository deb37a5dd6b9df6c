//! Transports for the member-gossip protocol
//!
//! This crate provides:
//! - The [`Transport`] seam the membership engine sends and receives through
//! - A lossy in-memory network for simulating many nodes in one process
//! - A UDP transport carrying one protocol message per datagram

pub mod sim;
pub mod transport;
pub mod udp;

pub use sim::{NetworkStats, SimNetwork};
pub use transport::{Transport, TransportError};
pub use udp::UdpTransport;
