//! Transport seam
//!
//! Delivery is best effort: messages may be dropped, duplicated or
//! reordered, and the protocol above is built to tolerate all three.

use bytes::Bytes;
use member_gossip_core::NodeIdentity;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Transport closed")]
    Closed,
    #[error("Outbound queue full, dropped message to {0}")]
    QueueFull(NodeIdentity),
    #[error("Endpoint {bound} cannot send as {requested}")]
    WrongEndpoint {
        bound: NodeIdentity,
        requested: NodeIdentity,
    },
    #[error("Unsupported listen address: {0}")]
    UnsupportedAddress(std::net::SocketAddr),
}

/// Fire-and-forget message transport.
///
/// `send` never waits for the peer; an `Ok` only means the message was
/// handed to the network. Payloads are owned, immutable buffers, so nothing
/// the sender keeps can be observed through them.
pub trait Transport: Send + Sync {
    /// Hand `payload` to the network for delivery to `to`.
    fn send(&self, from: NodeIdentity, to: NodeIdentity, payload: Bytes)
        -> Result<(), TransportError>;

    /// Drain every message currently queued for `at`.
    fn receive_all(&self, at: NodeIdentity) -> Vec<Bytes>;
}
