//! Join handshake
//!
//! A node whose identity is the introducer's starts the group alone. Any
//! other node sends a `JoinRequest` to the introducer and waits for a
//! `JoinReply`. Unanswered requests are re-sent every `join_timeout` ticks,
//! and after `join_attempts` requests the node gives up in `JoinFailed`.

use crate::node::{EngineError, Node, NodeState};
use member_gossip_core::{Envelope, ProtocolMessage, Tick};
use tracing::{debug, info, warn};

impl Node {
    /// Initialize local state and introduce this node to the group.
    ///
    /// An initialization error is fatal: the node stays `Uninitialized`
    /// and nothing is sent.
    pub fn bootstrap(&mut self) -> Result<(), EngineError> {
        if self.state != NodeState::Uninitialized {
            return Err(EngineError::InvalidState {
                state: self.state,
                action: "bootstrap",
            });
        }

        self.initialize()?;
        let now = self.clock_now();

        if self.config.identity == self.config.introducer {
            info!(node = %self.identity(), "starting up group");
            self.state = NodeState::InGroup;
        } else {
            info!(node = %self.identity(), introducer = %self.config.introducer, "trying to join");
            self.state = NodeState::Joining {
                attempts: 0,
                last_attempt: now,
            };
            self.send_join_request(now);
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        let config = &self.config;
        if config.tremove == 0 {
            return Err(EngineError::Init("tremove must be positive".into()));
        }
        if config.tfail > config.tremove {
            return Err(EngineError::Init(format!(
                "tfail {} exceeds tremove {}",
                config.tfail, config.tremove
            )));
        }
        if config.join_attempts == 0 {
            return Err(EngineError::Init("join_attempts must be positive".into()));
        }
        if !config.identity_space.contains(&config.identity) {
            return Err(EngineError::Init(format!(
                "own identity {} outside the identity space",
                config.identity
            )));
        }
        if !config.identity_space.contains(&config.introducer) {
            return Err(EngineError::Init(format!(
                "introducer {} outside the identity space",
                config.introducer
            )));
        }

        self.table.clear();
        self.suspected.clear();
        self.heartbeat = 0;
        self.state = NodeState::Initialized;
        Ok(())
    }

    fn send_join_request(&mut self, now: Tick) {
        if let NodeState::Joining {
            attempts,
            last_attempt,
        } = &mut self.state
        {
            *attempts += 1;
            *last_attempt = now;
        }
        let request = ProtocolMessage::JoinRequest(self.envelope(now));
        self.send(self.config.introducer, &request);
    }

    /// Retry or abandon an unanswered join.
    pub(crate) fn check_join_progress(&mut self, now: Tick) {
        let NodeState::Joining {
            attempts,
            last_attempt,
        } = self.state
        else {
            return;
        };

        if now.saturating_sub(last_attempt) < self.config.join_timeout {
            return;
        }

        if attempts >= self.config.join_attempts {
            warn!(
                node = %self.identity(),
                introducer = %self.config.introducer,
                attempts,
                "no join reply, giving up"
            );
            self.state = NodeState::JoinFailed;
            return;
        }

        debug!(node = %self.identity(), attempt = attempts + 1, "resending join request");
        self.send_join_request(now);
    }

    /// Admit the requester and answer with our table.
    pub(crate) fn on_join_request(&mut self, env: Envelope, now: Tick) {
        if self.state != NodeState::InGroup {
            debug!(node = %self.identity(), from = %env.sender, "not a member, ignoring join request");
            return;
        }

        if self.table.insert_if_absent(env.sender, env.heartbeat, now) {
            self.note_added(env.sender);
        }

        let reply = ProtocolMessage::JoinReply(self.envelope(now));
        self.send(env.sender, &reply);
    }

    /// Adopt the introducer's table and become a member.
    pub(crate) fn on_join_reply(&mut self, env: Envelope, now: Tick) {
        if !matches!(self.state, NodeState::Joining { .. } | NodeState::InGroup) {
            return;
        }

        if self.table.insert_if_absent(env.sender, env.heartbeat, now) {
            self.note_added(env.sender);
        }
        let outcome = self.table.merge(&env, now, self.config.tremove);
        for added in outcome.added {
            self.note_added(added);
        }

        if let NodeState::Joining { attempts, .. } = self.state {
            info!(node = %self.identity(), attempts, members = self.table.len(), "joined group");
            self.state = NodeState::InGroup;
        }
    }
}
