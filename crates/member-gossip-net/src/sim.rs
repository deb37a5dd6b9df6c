//! In-memory lossy network
//!
//! Hosts any number of endpoints in one process. Each endpoint has a private
//! inbox; a message is either dropped at send time (with the configured
//! probability) or appended to the receiver's inbox until drained.

use crate::transport::{Transport, TransportError};
use bytes::Bytes;
use member_gossip_core::NodeIdentity;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use tracing::trace;

/// Default inbox bound per endpoint
const DEFAULT_INBOX_CAPACITY: usize = 4096;

/// Network counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Messages handed to the network
    pub sent: u64,
    /// Messages lost to simulated loss or full inboxes
    pub dropped: u64,
    /// Messages drained by receivers
    pub delivered: u64,
}

/// Simulated network shared by every node of a simulation
pub struct SimNetwork {
    inboxes: Mutex<HashMap<NodeIdentity, VecDeque<Bytes>>>,
    rng: Mutex<StdRng>,
    stats: Mutex<NetworkStats>,
    drop_rate: f64,
    inbox_capacity: usize,
}

impl SimNetwork {
    /// Create a loss-free network; `seed` drives any later loss decisions.
    pub fn new(seed: u64) -> Self {
        Self {
            inboxes: Mutex::new(HashMap::new()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            stats: Mutex::new(NetworkStats::default()),
            drop_rate: 0.0,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }

    /// Drop each message independently with probability `rate` (clamped to 0..=1).
    pub fn with_drop_rate(mut self, rate: f64) -> Self {
        self.drop_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }

    /// Bound every inbox to `capacity` messages; overflow is dropped.
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    pub fn drop_rate(&self) -> f64 {
        self.drop_rate
    }

    /// Messages waiting for `at`
    pub fn pending(&self, at: &NodeIdentity) -> usize {
        self.inboxes.lock().get(at).map(VecDeque::len).unwrap_or(0)
    }

    /// Discard everything waiting for `at`
    pub fn clear_inbox(&self, at: &NodeIdentity) {
        self.inboxes.lock().remove(at);
    }

    pub fn stats(&self) -> NetworkStats {
        *self.stats.lock()
    }

    fn lose(&self) -> bool {
        self.drop_rate > 0.0 && self.rng.lock().gen_bool(self.drop_rate)
    }
}

impl Transport for SimNetwork {
    fn send(
        &self,
        from: NodeIdentity,
        to: NodeIdentity,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        self.stats.lock().sent += 1;

        if self.lose() {
            trace!(%from, %to, "simulated loss");
            self.stats.lock().dropped += 1;
            return Ok(());
        }

        let mut inboxes = self.inboxes.lock();
        let inbox = inboxes.entry(to).or_default();
        if inbox.len() >= self.inbox_capacity {
            trace!(%from, %to, "inbox full");
            drop(inboxes);
            self.stats.lock().dropped += 1;
            return Ok(());
        }
        inbox.push_back(payload);
        Ok(())
    }

    fn receive_all(&self, at: NodeIdentity) -> Vec<Bytes> {
        let drained: Vec<Bytes> = self
            .inboxes
            .lock()
            .get_mut(&at)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default();
        self.stats.lock().delivered += drained.len() as u64;
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> NodeIdentity {
        NodeIdentity::new(n, 0)
    }

    #[test]
    fn test_delivery_in_send_order() {
        let net = SimNetwork::new(1);
        net.send(id(1), id(2), Bytes::from_static(b"a")).unwrap();
        net.send(id(3), id(2), Bytes::from_static(b"b")).unwrap();

        assert_eq!(net.pending(&id(2)), 2);
        let got = net.receive_all(id(2));
        assert_eq!(got, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        assert!(net.receive_all(id(2)).is_empty());
        assert!(net.receive_all(id(4)).is_empty());

        let stats = net.stats();
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn test_total_loss() {
        let net = SimNetwork::new(1).with_drop_rate(1.0);
        for _ in 0..10 {
            net.send(id(1), id(2), Bytes::from_static(b"x")).unwrap();
        }
        assert_eq!(net.pending(&id(2)), 0);
        assert_eq!(net.stats().dropped, 10);
    }

    #[test]
    fn test_partial_loss_is_seeded() {
        let run = |seed| {
            let net = SimNetwork::new(seed).with_drop_rate(0.5);
            for _ in 0..200 {
                net.send(id(1), id(2), Bytes::from_static(b"x")).unwrap();
            }
            net.pending(&id(2))
        };
        let first = run(42);
        assert_eq!(first, run(42));
        assert!(first > 0 && first < 200);
    }

    #[test]
    fn test_inbox_capacity() {
        let net = SimNetwork::new(1).with_inbox_capacity(3);
        for _ in 0..5 {
            net.send(id(1), id(2), Bytes::from_static(b"x")).unwrap();
        }
        assert_eq!(net.pending(&id(2)), 3);
        assert_eq!(net.stats().dropped, 2);

        net.clear_inbox(&id(2));
        assert_eq!(net.pending(&id(2)), 0);
    }

    #[test]
    fn test_drop_rate_clamped() {
        assert_eq!(SimNetwork::new(0).with_drop_rate(7.0).drop_rate(), 1.0);
        assert_eq!(SimNetwork::new(0).with_drop_rate(-1.0).drop_rate(), 0.0);
        assert_eq!(SimNetwork::new(0).with_drop_rate(f64::NAN).drop_rate(), 0.0);
    }
}
