//! Membership table and merge rules
//!
//! Two merge rules write into the table, both stamping local receipt time:
//!
//! - **insert-if-absent** for single introductions (a join request sender,
//!   an unknown heartbeat sender);
//! - **full merge** for a piggybacked table snapshot: higher heartbeat wins,
//!   ties keep the local entry, and an unknown identity is only admitted if
//!   it was still fresh at the sender.
//!
//! The owner's own identity is never stored. Entries are removed only by
//! [`MembershipTable::evict_expired`].

use crate::message::Envelope;
use crate::types::*;
use std::collections::HashMap;

/// Result of applying a full merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Identities inserted by this merge
    pub added: Vec<NodeIdentity>,
    /// Existing entries whose heartbeat advanced
    pub updated: usize,
    /// Unknown entries dropped because they were stale at the sender
    pub stale: usize,
}

impl MergeOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.updated == 0
    }
}

/// Result of recording direct contact from a heartbeat sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// Sender was known; heartbeat bumped and timestamp refreshed
    Refreshed,
    /// Sender was unknown and has been inserted
    Inserted,
    /// Sender is the table owner
    Ignored,
}

/// A node's view of the group.
#[derive(Debug, Clone)]
pub struct MembershipTable {
    owner: NodeIdentity,
    entries: HashMap<NodeIdentity, MembershipEntry>,
}

impl MembershipTable {
    /// Create an empty table owned by `owner`
    pub fn new(owner: NodeIdentity) -> Self {
        Self {
            owner,
            entries: HashMap::new(),
        }
    }

    pub fn owner(&self) -> NodeIdentity {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, identity: &NodeIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn get(&self, identity: &NodeIdentity) -> Option<&MembershipEntry> {
        self.entries.get(identity)
    }

    /// Known identities in ascending order
    pub fn identities(&self) -> Vec<NodeIdentity> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Copy of every entry, ordered by identity.
    ///
    /// This is what goes out in a gossip payload; the caller owns the copy.
    pub fn snapshot(&self) -> Vec<MembershipEntry> {
        let mut entries: Vec<_> = self.entries.values().copied().collect();
        entries.sort_by_key(|e| e.identity);
        entries
    }

    /// Insert `identity` unless it is already known or is the owner.
    ///
    /// Returns `true` if a new entry was created.
    pub fn insert_if_absent(&mut self, identity: NodeIdentity, heartbeat: u64, now: Tick) -> bool {
        if identity == self.owner || self.entries.contains_key(&identity) {
            return false;
        }
        self.entries
            .insert(identity, MembershipEntry::new(identity, heartbeat, now));
        true
    }

    /// Record a heartbeat received directly from `sender`.
    ///
    /// A known sender's heartbeat advances to `max(stored + 1, reported)` and
    /// its timestamp is refreshed; an unknown sender is inserted with the
    /// reported heartbeat.
    pub fn record_ping(&mut self, sender: NodeIdentity, reported: u64, now: Tick) -> PingOutcome {
        if sender == self.owner {
            return PingOutcome::Ignored;
        }
        match self.entries.get_mut(&sender) {
            Some(entry) => {
                entry.heartbeat = entry.heartbeat.saturating_add(1).max(reported);
                entry.last_local_update = now;
                PingOutcome::Refreshed
            }
            None => {
                self.entries
                    .insert(sender, MembershipEntry::new(sender, reported, now));
                PingOutcome::Inserted
            }
        }
    }

    /// Fold a piggybacked table snapshot into this table.
    pub fn merge(&mut self, envelope: &Envelope, now: Tick, tremove: Tick) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for incoming in &envelope.members {
            if incoming.identity == self.owner {
                continue;
            }

            match self.entries.get_mut(&incoming.identity) {
                Some(local) => {
                    if incoming.heartbeat > local.heartbeat {
                        local.heartbeat = incoming.heartbeat;
                        local.last_local_update = now;
                        outcome.updated += 1;
                    }
                }
                None => {
                    if envelope.reported_age(incoming) < tremove {
                        self.entries.insert(
                            incoming.identity,
                            MembershipEntry::new(incoming.identity, incoming.heartbeat, now),
                        );
                        outcome.added.push(incoming.identity);
                    } else {
                        outcome.stale += 1;
                    }
                }
            }
        }

        outcome
    }

    /// Remove every entry unrefreshed for `tremove` ticks or more.
    ///
    /// Returns the evicted entries ordered by identity.
    pub fn evict_expired(&mut self, now: Tick, tremove: Tick) -> Vec<MembershipEntry> {
        let mut evicted = Vec::new();
        self.entries.retain(|_, entry| {
            if entry.age(now) >= tremove {
                evicted.push(*entry);
                false
            } else {
                true
            }
        });
        evicted.sort_by_key(|e| e.identity);
        evicted
    }

    /// Identities past the soft threshold but not yet due for eviction.
    pub fn suspects(&self, now: Tick, tfail: Tick, tremove: Tick) -> Vec<NodeIdentity> {
        let mut ids: Vec<_> = self
            .entries
            .values()
            .filter(|e| {
                let age = e.age(now);
                age >= tfail && age < tremove
            })
            .map(|e| e.identity)
            .collect();
        ids.sort();
        ids
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
