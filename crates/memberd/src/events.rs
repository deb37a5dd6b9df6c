//! Membership change events
//!
//! The engine reports every table insertion and eviction here. Nothing in
//! the protocol depends on what a sink does with them.

use member_gossip_core::NodeIdentity;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

/// Sink for membership changes observed by a node
pub trait MembershipEvents: Send + Sync {
    /// `observer` added `added` to its table
    fn member_added(&self, observer: NodeIdentity, added: NodeIdentity);
    /// `observer` evicted `removed` from its table
    fn member_removed(&self, observer: NodeIdentity, removed: NodeIdentity);
}

/// A single recorded change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MembershipEvent {
    Added {
        observer: NodeIdentity,
        subject: NodeIdentity,
    },
    Removed {
        observer: NodeIdentity,
        subject: NodeIdentity,
    },
}

impl MembershipEvent {
    pub fn observer(&self) -> NodeIdentity {
        match self {
            Self::Added { observer, .. } | Self::Removed { observer, .. } => *observer,
        }
    }

    pub fn subject(&self) -> NodeIdentity {
        match self {
            Self::Added { subject, .. } | Self::Removed { subject, .. } => *subject,
        }
    }
}

/// Emits each change as a structured tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl MembershipEvents for TracingEvents {
    fn member_added(&self, observer: NodeIdentity, added: NodeIdentity) {
        info!(%observer, member = %added, "member added");
    }

    fn member_removed(&self, observer: NodeIdentity, removed: NodeIdentity) {
        info!(%observer, member = %removed, "member removed");
    }
}

/// Keeps every change in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordedEvents {
    events: Mutex<Vec<MembershipEvent>>,
}

impl RecordedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn events(&self) -> Vec<MembershipEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Times `observer` added `subject`
    pub fn added(&self, observer: NodeIdentity, subject: NodeIdentity) -> usize {
        self.count(|e| *e == MembershipEvent::Added { observer, subject })
    }

    /// Times `observer` removed `subject`
    pub fn removed(&self, observer: NodeIdentity, subject: NodeIdentity) -> usize {
        self.count(|e| *e == MembershipEvent::Removed { observer, subject })
    }

    /// Every event seen by `observer`
    pub fn observed_by(&self, observer: NodeIdentity) -> Vec<MembershipEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.observer() == observer)
            .copied()
            .collect()
    }

    fn count(&self, pred: impl Fn(&MembershipEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl MembershipEvents for RecordedEvents {
    fn member_added(&self, observer: NodeIdentity, added: NodeIdentity) {
        self.events.lock().push(MembershipEvent::Added {
            observer,
            subject: added,
        });
    }

    fn member_removed(&self, observer: NodeIdentity, removed: NodeIdentity) {
        self.events.lock().push(MembershipEvent::Removed {
            observer,
            subject: removed,
        });
    }
}
