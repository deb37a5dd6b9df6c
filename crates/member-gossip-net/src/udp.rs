//! UDP transport
//!
//! One protocol message per datagram. A receive task fills a bounded inbox
//! that the engine drains on its own schedule; a send task drains a bounded
//! outbound queue. Both drop on overflow, which the protocol treats like
//! any other loss.

use crate::transport::{Transport, TransportError};
use bytes::Bytes;
use member_gossip_core::NodeIdentity;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Largest UDP payload over IPv4
const MAX_DATAGRAM: usize = 65_507;
/// First pause after a failed receive
const RECV_BACKOFF_MIN: Duration = Duration::from_millis(10);
/// Longest pause between receive retries
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// UDP endpoint for a single node
pub struct UdpTransport {
    identity: NodeIdentity,
    local_addr: SocketAddr,
    inbox: Arc<Mutex<VecDeque<Bytes>>>,
    outbound: mpsc::Sender<(SocketAddr, Bytes)>,
    tasks: Vec<JoinHandle<()>>,
}

impl UdpTransport {
    /// Bind `listen` and start the socket tasks.
    ///
    /// The address must be a concrete IPv4 address: it becomes the node's
    /// identity, which peers use to reach it.
    pub async fn bind(listen: SocketAddr, queue_depth: usize) -> Result<Self, TransportError> {
        let socket = Arc::new(UdpSocket::bind(listen).await?);
        let local_addr = socket.local_addr()?;

        let identity = match local_addr {
            SocketAddr::V4(v4) if !v4.ip().is_unspecified() => NodeIdentity::from(v4),
            other => return Err(TransportError::UnsupportedAddress(other)),
        };

        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        let (outbound, rx) = mpsc::channel(queue_depth.max(1));

        let tasks = vec![
            tokio::spawn(receive_loop(socket.clone(), inbox.clone(), queue_depth.max(1))),
            tokio::spawn(send_loop(socket, rx)),
        ];

        info!(%identity, "UDP transport bound on {}", local_addr);

        Ok(Self {
            identity,
            local_addr,
            inbox,
            outbound,
            tasks,
        })
    }

    /// Identity derived from the bound address
    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, inbox: Arc<Mutex<VecDeque<Bytes>>>, capacity: usize) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut failures: u32 = 0;
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                failures = 0;
                let mut inbox = inbox.lock();
                if inbox.len() >= capacity {
                    trace!(%from, "inbox full, dropping datagram");
                    continue;
                }
                inbox.push_back(Bytes::copy_from_slice(&buf[..len]));
            }
            Err(e) => {
                // warn once per streak
                if failures == 0 {
                    warn!("UDP receive error: {}", e);
                } else {
                    debug!(failures, "UDP receive error: {}", e);
                }
                failures = failures.saturating_add(1);
                tokio::time::sleep(receive_backoff(failures)).await;
            }
        }
    }
}

/// Pause after `failures` consecutive receive errors: doubles from
/// [`RECV_BACKOFF_MIN`] up to [`RECV_BACKOFF_MAX`].
fn receive_backoff(failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    RECV_BACKOFF_MIN
        .saturating_mul(1 << shift)
        .min(RECV_BACKOFF_MAX)
}

async fn send_loop(socket: Arc<UdpSocket>, mut rx: mpsc::Receiver<(SocketAddr, Bytes)>) {
    while let Some((addr, payload)) = rx.recv().await {
        if let Err(e) = socket.send_to(&payload, addr).await {
            debug!(%addr, "UDP send failed: {}", e);
        }
    }
}

impl Transport for UdpTransport {
    fn send(
        &self,
        from: NodeIdentity,
        to: NodeIdentity,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        if from != self.identity {
            return Err(TransportError::WrongEndpoint {
                bound: self.identity,
                requested: from,
            });
        }
        self.outbound
            .try_send((to.socket_addr(), payload))
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::QueueFull(to),
                TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    fn receive_all(&self, at: NodeIdentity) -> Vec<Bytes> {
        if at != self.identity {
            debug!(bound = %self.identity, requested = %at, "receive for foreign identity");
            return Vec::new();
        }
        self.inbox.lock().drain(..).collect()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_backoff_grows_and_caps() {
        assert_eq!(receive_backoff(1), RECV_BACKOFF_MIN);
        assert_eq!(receive_backoff(2), RECV_BACKOFF_MIN * 2);
        assert_eq!(receive_backoff(4), RECV_BACKOFF_MIN * 8);
        assert_eq!(receive_backoff(8), RECV_BACKOFF_MAX);
        assert_eq!(receive_backoff(u32::MAX), RECV_BACKOFF_MAX);
    }

    async fn drain_eventually(transport: &UdpTransport, want: usize) -> Vec<Bytes> {
        let mut got = Vec::new();
        for _ in 0..200 {
            got.extend(transport.receive_all(transport.identity()));
            if got.len() >= want {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        got
    }

    #[tokio::test]
    async fn test_datagram_exchange() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), 64)
            .await
            .unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), 64)
            .await
            .unwrap();

        assert_eq!(a.identity().socket_addr(), a.local_addr());

        a.send(a.identity(), b.identity(), Bytes::from_static(b"hello"))
            .unwrap();
        let got = drain_eventually(&b, 1).await;
        assert_eq!(got, vec![Bytes::from_static(b"hello")]);
    }

    #[tokio::test]
    async fn test_rejects_foreign_sender() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), 8)
            .await
            .unwrap();
        let other = NodeIdentity::new(1, 1);
        let err = a.send(other, a.identity(), Bytes::new()).unwrap_err();
        assert!(matches!(err, TransportError::WrongEndpoint { .. }));
        assert!(a.receive_all(other).is_empty());
    }

    #[tokio::test]
    async fn test_unspecified_address_rejected() {
        let err = UdpTransport::bind("0.0.0.0:0".parse().unwrap(), 8)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::UnsupportedAddress(_)));
    }
}
