//! Core protocol types
//!
//! Identities are plain value types: they are copied into tables and
//! messages, never referenced across node boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::ops::RangeInclusive;

/// Protocol time, counted in ticks of the local clock.
pub type Tick = u64;

// =============================================================================
// IDENTITY
// =============================================================================

/// Identity of a participant: a 32-bit host id and a 16-bit port.
///
/// Stable for the lifetime of a run. When nodes talk over UDP the host id is
/// the IPv4 address in network order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeIdentity {
    pub host_id: u32,
    pub port: u16,
}

impl NodeIdentity {
    pub const fn new(host_id: u32, port: u16) -> Self {
        Self { host_id, port }
    }

    /// Socket address this identity is reachable at.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(self.host_id), self.port))
    }
}

impl From<SocketAddrV4> for NodeIdentity {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(u32::from(*addr.ip()), addr.port())
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", Ipv4Addr::from(self.host_id), self.port)
    }
}

/// Range of host ids a node accepts in protocol traffic.
///
/// Messages naming an identity outside this range are rejected whole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentitySpace {
    host_ids: RangeInclusive<u32>,
}

impl IdentitySpace {
    /// Accept every host id.
    pub fn unbounded() -> Self {
        Self {
            host_ids: 0..=u32::MAX,
        }
    }

    /// Accept host ids in `range` only.
    pub fn new(range: RangeInclusive<u32>) -> Self {
        Self { host_ids: range }
    }

    pub fn contains(&self, identity: &NodeIdentity) -> bool {
        self.host_ids.contains(&identity.host_id)
    }
}

impl Default for IdentitySpace {
    fn default() -> Self {
        Self::unbounded()
    }
}

// =============================================================================
// MEMBERSHIP ENTRY
// =============================================================================

/// One row of a membership table.
///
/// `last_local_update` is always stamped with the clock of the node holding
/// the entry. When an entry travels in a message it still carries the
/// sender's stamp; the receiver only uses it to judge the entry's age at the
/// sender, never stores it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEntry {
    pub identity: NodeIdentity,
    pub heartbeat: u64,
    pub last_local_update: Tick,
}

impl MembershipEntry {
    pub fn new(identity: NodeIdentity, heartbeat: u64, now: Tick) -> Self {
        Self {
            identity,
            heartbeat,
            last_local_update: now,
        }
    }

    /// Ticks since this entry was last created or improved.
    pub fn age(&self, now: Tick) -> Tick {
        now.saturating_sub(self.last_local_update)
    }
}
