//! Error types for member-gossip

use crate::types::NodeIdentity;
use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Payload shorter than the fixed message header
    #[error("truncated message: {len} bytes (header is {header})")]
    Truncated { len: usize, header: usize },

    /// Kind byte does not name a known message
    #[error("unknown message kind: {0}")]
    UnknownKind(u8),

    /// Member list section is not a whole number of records
    #[error("member list has {0} trailing bytes")]
    RaggedMemberList(usize),

    /// Sender or member record outside the configured identity space
    #[error("identity {0} outside the identity space")]
    IdentityOutOfRange(NodeIdentity),
}
