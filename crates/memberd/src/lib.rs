//! memberd - heartbeat gossip membership
//!
//! This crate provides:
//! - The membership engine: join handshake, heartbeat gossip, reaper
//! - Clock and membership-event collaborators
//! - An in-process cluster simulator
//! - A UDP daemon driving one engine on a fixed tick

pub mod clock;
pub mod config;
pub mod events;
pub mod gossip;
pub mod join;
pub mod node;
pub mod reaper;
pub mod server;
pub mod sim;

pub use clock::{Clock, ManualClock, TickClock};
pub use config::{Config, EngineConfig};
pub use events::{MembershipEvent, MembershipEvents, RecordedEvents, TracingEvents};
pub use node::{EngineError, Node, NodeState, NodeStats};
pub use server::{Server, ServerError};
pub use sim::{Simulation, SimulationConfig, SimulationError, SimulationReport};
