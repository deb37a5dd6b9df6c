//! Heartbeat dissemination
//!
//! Every tick an in-group node bumps its own heartbeat and pushes a full
//! copy of its table to every member it knows. Receivers count the push as
//! direct contact from the sender and fold the piggybacked table in with the
//! full-merge rule.

use crate::node::Node;
use member_gossip_core::{Envelope, PingOutcome, ProtocolMessage, Tick};
use tracing::trace;

impl Node {
    /// Push our table to every known member.
    pub(crate) fn disseminate(&mut self, now: Tick) {
        self.heartbeat += 1;

        // one encoding shared by every recipient; the buffer is immutable
        let payload = ProtocolMessage::Heartbeat(self.envelope(now)).encode();
        for peer in self.table.identities() {
            self.send_payload(peer, payload.clone());
        }
    }

    /// Apply a heartbeat received from a peer.
    pub(crate) fn on_heartbeat(&mut self, env: Envelope, now: Tick) {
        if self.table.record_ping(env.sender, env.heartbeat, now) == PingOutcome::Inserted {
            self.note_added(env.sender);
        }

        let outcome = self.table.merge(&env, now, self.config.tremove);
        trace!(
            node = %self.identity(),
            from = %env.sender,
            added = outcome.added.len(),
            updated = outcome.updated,
            stale = outcome.stale,
            "merged heartbeat"
        );
        for added in outcome.added {
            self.note_added(added);
        }
    }
}
