//! Protocol messages and wire codec
//!
//! Wire format (big-endian, one message per datagram):
//! - 1 byte: message kind
//! - 4 bytes: sender host id
//! - 2 bytes: sender port
//! - 8 bytes: sender heartbeat
//! - 8 bytes: sender clock at send time
//! - N * 22 bytes: member records `{host_id 4, port 2, heartbeat 8, timestamp 8}`
//!
//! The record count is implied by the payload length.

use crate::error::{Error, Result};
use crate::types::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the fixed header preceding the member records.
pub const HEADER_LEN: usize = 1 + 4 + 2 + 8 + 8;

/// Size of one encoded member record.
pub const RECORD_LEN: usize = 4 + 2 + 8 + 8;

/// Message kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Ask an existing member to admit the sender
    JoinRequest = 0,
    /// Admission answer carrying the member's table
    JoinReply = 1,
    /// Periodic liveness gossip (PING)
    Heartbeat = 2,
}

impl TryFrom<u8> for MessageKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::JoinRequest),
            1 => Ok(Self::JoinReply),
            2 => Ok(Self::Heartbeat),
            other => Err(Error::UnknownKind(other)),
        }
    }
}

/// Fields every protocol message carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Sending node
    pub sender: NodeIdentity,
    /// Sender's own heartbeat counter
    pub heartbeat: u64,
    /// Sender's clock when the message was built
    pub sent_at: Tick,
    /// Copy of the sender's table at send time
    pub members: Vec<MembershipEntry>,
}

impl Envelope {
    /// Age of `entry` at the sender when this message was built.
    pub fn reported_age(&self, entry: &MembershipEntry) -> Tick {
        self.sent_at.saturating_sub(entry.last_local_update)
    }
}

/// A membership protocol message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolMessage {
    JoinRequest(Envelope),
    JoinReply(Envelope),
    Heartbeat(Envelope),
}

impl ProtocolMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::JoinRequest(_) => MessageKind::JoinRequest,
            Self::JoinReply(_) => MessageKind::JoinReply,
            Self::Heartbeat(_) => MessageKind::Heartbeat,
        }
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::JoinRequest(env) | Self::JoinReply(env) | Self::Heartbeat(env) => env,
        }
    }

    pub fn sender(&self) -> NodeIdentity {
        self.envelope().sender
    }

    /// Reject the message if any identity it names is outside `space`.
    pub fn validate(&self, space: &IdentitySpace) -> Result<()> {
        let env = self.envelope();
        if !space.contains(&env.sender) {
            return Err(Error::IdentityOutOfRange(env.sender));
        }
        for entry in &env.members {
            if !space.contains(&entry.identity) {
                return Err(Error::IdentityOutOfRange(entry.identity));
            }
        }
        Ok(())
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Bytes {
        let env = self.envelope();
        let mut dst = BytesMut::with_capacity(HEADER_LEN + env.members.len() * RECORD_LEN);

        dst.put_u8(self.kind() as u8);
        put_identity(&mut dst, &env.sender);
        dst.put_u64(env.heartbeat);
        dst.put_u64(env.sent_at);

        for entry in &env.members {
            put_identity(&mut dst, &entry.identity);
            dst.put_u64(entry.heartbeat);
            dst.put_u64(entry.last_local_update);
        }

        dst.freeze()
    }

    /// Decode wire bytes.
    pub fn decode(mut src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_LEN {
            return Err(Error::Truncated {
                len: src.len(),
                header: HEADER_LEN,
            });
        }

        let kind = MessageKind::try_from(src.get_u8())?;
        let sender = get_identity(&mut src);
        let heartbeat = src.get_u64();
        let sent_at = src.get_u64();

        let trailing = src.len() % RECORD_LEN;
        if trailing != 0 {
            return Err(Error::RaggedMemberList(trailing));
        }

        let mut members = Vec::with_capacity(src.len() / RECORD_LEN);
        while src.has_remaining() {
            let identity = get_identity(&mut src);
            let heartbeat = src.get_u64();
            let last_local_update = src.get_u64();
            members.push(MembershipEntry {
                identity,
                heartbeat,
                last_local_update,
            });
        }

        let env = Envelope {
            sender,
            heartbeat,
            sent_at,
            members,
        };

        Ok(match kind {
            MessageKind::JoinRequest => Self::JoinRequest(env),
            MessageKind::JoinReply => Self::JoinReply(env),
            MessageKind::Heartbeat => Self::Heartbeat(env),
        })
    }
}

fn put_identity(dst: &mut BytesMut, identity: &NodeIdentity) {
    dst.put_u32(identity.host_id);
    dst.put_u16(identity.port);
}

fn get_identity(src: &mut &[u8]) -> NodeIdentity {
    let host_id = src.get_u32();
    let port = src.get_u16();
    NodeIdentity { host_id, port }
}
