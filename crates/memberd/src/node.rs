//! Membership engine
//!
//! One [`Node`] per participant. It owns its table and lifecycle state
//! exclusively; the only way anything crosses between nodes is an encoded
//! message handed to the [`Transport`].
//!
//! Each call to [`Node::step`] is one protocol tick:
//!
//! 1. drain the inbox, handling every message to completion in turn;
//! 2. while joining, retry or give up on the join handshake;
//! 3. once in the group, run the reaper and then gossip the table.
//!
//! The join handshake lives in [`crate::join`], dissemination in
//! [`crate::gossip`] and eviction in [`crate::reaper`].

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::events::MembershipEvents;
use bytes::Bytes;
use member_gossip_core::{Envelope, MembershipTable, NodeIdentity, ProtocolMessage, Tick};
use member_gossip_net::Transport;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Init(String),
    #[error("Cannot {action} while {state:?}")]
    InvalidState {
        state: NodeState,
        action: &'static str,
    },
    #[error("Rejected message: {0}")]
    Protocol(#[from] member_gossip_core::Error),
}

/// Lifecycle of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    /// Constructed, bootstrap not yet run
    Uninitialized,
    /// Local state set up, not yet introduced
    Initialized,
    /// Join request outstanding
    Joining { attempts: u32, last_attempt: Tick },
    /// Full member: reaping and gossiping every tick
    InGroup,
    /// Gave up joining; terminal
    JoinFailed,
    /// Crashed or shut down; terminal
    Failed,
}

/// Engine counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NodeStats {
    pub state: NodeState,
    pub members: usize,
    pub heartbeat: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_rejected: u64,
}

/// A single participant's membership state machine
pub struct Node {
    pub(crate) config: EngineConfig,
    pub(crate) table: MembershipTable,
    pub(crate) state: NodeState,
    /// Our own heartbeat counter
    pub(crate) heartbeat: u64,
    /// Members currently past the soft threshold
    pub(crate) suspected: HashSet<NodeIdentity>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn MembershipEvents>,
    sent: u64,
    received: u64,
    rejected: u64,
}

impl Node {
    /// Create a node; nothing happens until [`Node::bootstrap`].
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn MembershipEvents>,
    ) -> Self {
        Self {
            table: MembershipTable::new(config.identity),
            config,
            state: NodeState::Uninitialized,
            heartbeat: 0,
            suspected: HashSet::new(),
            transport,
            clock,
            events,
            sent: 0,
            received: 0,
            rejected: 0,
        }
    }

    pub fn identity(&self) -> NodeIdentity {
        self.config.identity
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_in_group(&self) -> bool {
        self.state == NodeState::InGroup
    }

    /// Our own heartbeat counter
    pub fn heartbeat(&self) -> u64 {
        self.heartbeat
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    /// Known members in identity order
    pub fn members(&self) -> Vec<NodeIdentity> {
        self.table.identities()
    }

    /// Members past the soft liveness threshold as of now
    pub fn suspects(&self) -> Vec<NodeIdentity> {
        self.table
            .suspects(self.clock_now(), self.config.tfail, self.config.tremove)
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            state: self.state,
            members: self.table.len(),
            heartbeat: self.heartbeat,
            messages_sent: self.sent,
            messages_received: self.received,
            messages_rejected: self.rejected,
        }
    }

    /// Run one protocol tick.
    pub fn step(&mut self) {
        match self.state {
            NodeState::Uninitialized | NodeState::Failed => return,
            NodeState::JoinFailed => {
                let discarded = self.transport.receive_all(self.identity()).len();
                if discarded > 0 {
                    debug!(node = %self.identity(), discarded, "join failed, discarding inbound");
                }
                return;
            }
            _ => {}
        }

        let now = self.clock_now();

        for payload in self.transport.receive_all(self.identity()) {
            self.received += 1;
            if let Err(e) = self.handle_payload(&payload, now) {
                self.rejected += 1;
                warn!(node = %self.identity(), "{}", e);
            }
        }

        match self.state {
            NodeState::Joining { .. } => self.check_join_progress(now),
            NodeState::InGroup => {
                self.reap(now);
                self.disseminate(now);
            }
            _ => {}
        }
    }

    /// Decode, validate and dispatch one inbound payload.
    ///
    /// A message is checked in full before it touches the table, so a
    /// rejected message leaves no trace.
    fn handle_payload(&mut self, payload: &[u8], now: Tick) -> Result<(), EngineError> {
        let message = ProtocolMessage::decode(payload)?;
        message.validate(&self.config.identity_space)?;

        match message {
            ProtocolMessage::JoinRequest(env) => self.on_join_request(env, now),
            ProtocolMessage::JoinReply(env) => self.on_join_reply(env, now),
            ProtocolMessage::Heartbeat(env) => self.on_heartbeat(env, now),
        }
        Ok(())
    }

    /// Crash or tear down: the table is destroyed and the node goes silent.
    pub fn shut_down(&mut self) {
        if self.state == NodeState::Failed {
            return;
        }
        info!(node = %self.identity(), members = self.table.len(), "node shutting down");
        self.table.clear();
        self.suspected.clear();
        self.state = NodeState::Failed;
    }

    pub(crate) fn clock_now(&self) -> Tick {
        self.clock.now()
    }

    /// Our identity, heartbeat and a copy of the table, as of `now`.
    pub(crate) fn envelope(&self, now: Tick) -> Envelope {
        Envelope {
            sender: self.identity(),
            heartbeat: self.heartbeat,
            sent_at: now,
            members: self.table.snapshot(),
        }
    }

    pub(crate) fn send(&mut self, to: NodeIdentity, message: &ProtocolMessage) {
        self.send_payload(to, message.encode());
    }

    pub(crate) fn send_payload(&mut self, to: NodeIdentity, payload: Bytes) {
        match self.transport.send(self.identity(), to, payload) {
            Ok(()) => self.sent += 1,
            Err(e) => debug!(node = %self.identity(), peer = %to, "send failed: {}", e),
        }
    }

    pub(crate) fn note_added(&self, added: NodeIdentity) {
        self.events.member_added(self.identity(), added);
    }

    pub(crate) fn note_removed(&self, removed: NodeIdentity) {
        self.events.member_removed(self.identity(), removed);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::RecordedEvents;
    use member_gossip_core::{IdentitySpace, MembershipEntry};
    use member_gossip_net::SimNetwork;

    /// A node wired to a shared test network, clock and event log.
    pub(crate) struct Harness {
        pub net: Arc<SimNetwork>,
        pub clock: Arc<ManualClock>,
        pub events: Arc<RecordedEvents>,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            Self {
                net: Arc::new(SimNetwork::new(0)),
                clock: Arc::new(ManualClock::new(0)),
                events: Arc::new(RecordedEvents::new()),
            }
        }

        pub(crate) fn node(&self, n: u32, introducer: u32) -> Node {
            let config = EngineConfig::new(id(n), id(introducer))
                .with_identity_space(IdentitySpace::new(1..=10));
            self.node_with(config)
        }

        pub(crate) fn node_with(&self, config: EngineConfig) -> Node {
            Node::new(
                config,
                self.net.clone(),
                self.clock.clone(),
                self.events.clone(),
            )
        }

        /// Decode everything waiting for `n`
        pub(crate) fn inbox(&self, n: u32) -> Vec<ProtocolMessage> {
            self.net
                .receive_all(id(n))
                .iter()
                .map(|b| ProtocolMessage::decode(b).unwrap())
                .collect()
        }

        pub(crate) fn deliver(&self, to: u32, message: ProtocolMessage) {
            self.net
                .send(message.sender(), id(to), message.encode())
                .unwrap();
        }
    }

    pub(crate) fn id(n: u32) -> NodeIdentity {
        NodeIdentity::new(n, 0)
    }

    pub(crate) fn heartbeat_from(
        n: u32,
        heartbeat: u64,
        sent_at: Tick,
        members: Vec<MembershipEntry>,
    ) -> ProtocolMessage {
        ProtocolMessage::Heartbeat(Envelope {
            sender: id(n),
            heartbeat,
            sent_at,
            members,
        })
    }

    #[test]
    fn test_new_node_is_inert() {
        let h = Harness::new();
        let mut node = h.node(2, 1);
        h.deliver(2, heartbeat_from(3, 1, 0, vec![]));

        node.step();
        assert_eq!(node.state(), NodeState::Uninitialized);
        assert!(node.members().is_empty());
        // message left untouched for a later step
        assert_eq!(h.net.pending(&id(2)), 1);
    }

    #[test]
    fn test_malformed_message_rejected_not_fatal() {
        let h = Harness::new();
        let mut node = h.node(1, 1);
        node.bootstrap().unwrap();

        h.net
            .send(id(2), id(1), Bytes::from_static(&[2, 0, 0]))
            .unwrap();
        h.deliver(1, heartbeat_from(3, 1, 0, vec![]));
        node.step();

        let stats = node.stats();
        assert_eq!(stats.messages_received, 2);
        assert_eq!(stats.messages_rejected, 1);
        assert_eq!(node.members(), vec![id(3)]);
    }

    #[test]
    fn test_out_of_space_identity_rejects_whole_message() {
        let h = Harness::new();
        let mut node = h.node(1, 1);
        node.bootstrap().unwrap();

        h.deliver(
            1,
            heartbeat_from(
                3,
                1,
                0,
                vec![
                    MembershipEntry::new(id(4), 1, 0),
                    MembershipEntry::new(id(42), 1, 0),
                ],
            ),
        );
        node.step();

        assert!(node.members().is_empty());
        assert_eq!(node.stats().messages_rejected, 1);
        assert!(node.is_in_group());
    }

    #[test]
    fn test_shut_down_goes_silent() {
        let h = Harness::new();
        let mut node = h.node(1, 1);
        node.bootstrap().unwrap();
        h.deliver(1, heartbeat_from(2, 1, 0, vec![]));
        node.step();
        assert_eq!(node.members(), vec![id(2)]);
        h.inbox(2);

        node.shut_down();
        assert_eq!(node.state(), NodeState::Failed);
        assert!(node.members().is_empty());

        h.clock.advance(1);
        node.step();
        assert!(h.inbox(2).is_empty());
    }

    #[test]
    fn test_stats_count_traffic() {
        let h = Harness::new();
        let mut node = h.node(1, 1);
        node.bootstrap().unwrap();
        h.deliver(1, heartbeat_from(2, 1, 0, vec![MembershipEntry::new(id(3), 1, 0)]));

        node.step();
        let stats = node.stats();
        assert_eq!(stats.messages_received, 1);
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.members, 2);
        assert_eq!(stats.heartbeat, 1);
    }
}
