//! member-gossip core library
//!
//! Pure protocol state for the heartbeat membership protocol. Nothing in
//! this crate performs I/O or reads a clock: every operation that needs the
//! current time takes it as an argument, in ticks.
//!
//! # Modules
//!
//! - [`types`]: Identities, membership entries and the identity space
//! - [`message`]: Protocol messages and their wire codec
//! - [`table`]: The membership table with its merge and eviction rules
//! - [`error`]: Error types

pub mod error;
pub mod message;
pub mod table;
pub mod types;

#[cfg(test)]
mod test_vectors;

pub use error::{Error, Result};
pub use message::{Envelope, MessageKind, ProtocolMessage};
pub use table::{MembershipTable, MergeOutcome, PingOutcome};
pub use types::*;
