//! Configuration for memberd

use clap::{Args, Parser, Subcommand};
use member_gossip_core::{IdentitySpace, NodeIdentity, Tick};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default soft liveness threshold (ticks)
pub const DEFAULT_TFAIL: Tick = 5;
/// Default hard eviction threshold (ticks)
pub const DEFAULT_TREMOVE: Tick = 20;
/// Default ticks to wait for a join reply before retrying
pub const DEFAULT_JOIN_TIMEOUT: Tick = 10;
/// Default join requests sent before giving up
pub const DEFAULT_JOIN_ATTEMPTS: u32 = 3;

/// memberd - heartbeat gossip membership daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "memberd")]
#[command(author, version, about = "Heartbeat gossip membership daemon", long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty", global = true)]
    pub log_format: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run one member over UDP
    Run(RunArgs),
    /// Simulate a whole cluster in-process over a lossy network
    Simulate(SimulateArgs),
}

/// Protocol thresholds shared by both modes
#[derive(Args, Debug, Clone)]
pub struct ProtocolArgs {
    /// Soft liveness threshold in ticks (suspicion is reported, never acted on)
    #[arg(long, default_value_t = DEFAULT_TFAIL)]
    pub tfail: Tick,

    /// Eviction threshold in ticks
    #[arg(long, default_value_t = DEFAULT_TREMOVE)]
    pub tremove: Tick,

    /// Ticks to wait for a join reply before resending the request
    #[arg(long, default_value_t = DEFAULT_JOIN_TIMEOUT)]
    pub join_timeout: Tick,

    /// Join requests to send before giving up
    #[arg(long, default_value_t = DEFAULT_JOIN_ATTEMPTS)]
    pub join_attempts: u32,
}

impl Default for ProtocolArgs {
    fn default() -> Self {
        Self {
            tfail: DEFAULT_TFAIL,
            tremove: DEFAULT_TREMOVE,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            join_attempts: DEFAULT_JOIN_ATTEMPTS,
        }
    }
}

impl ProtocolArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tremove == 0 {
            anyhow::bail!("tremove must be at least one tick");
        }
        if self.tfail > self.tremove {
            anyhow::bail!(
                "tfail ({}) cannot exceed tremove ({})",
                self.tfail,
                self.tremove
            );
        }
        if self.join_timeout == 0 {
            anyhow::bail!("join timeout must be at least one tick");
        }
        if self.join_attempts == 0 {
            anyhow::bail!("at least one join attempt is required");
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// UDP listen address; its IPv4 address and port form the node identity
    #[arg(short, long, env = "MEMBERD_LISTEN", default_value = "127.0.0.1:9100")]
    pub listen: SocketAddr,

    /// Well-known introducer address (omit to start a new group)
    #[arg(long, env = "MEMBERD_INTRODUCER")]
    pub introducer: Option<SocketAddr>,

    /// Protocol tick duration in milliseconds
    #[arg(long, default_value = "1000")]
    pub tick_ms: u64,

    /// Inbound and outbound datagram queue depth
    #[arg(long, default_value = "1024")]
    pub queue_depth: usize,

    #[command(flatten)]
    pub protocol: ProtocolArgs,
}

impl RunArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.protocol.validate()?;
        if self.tick_ms == 0 {
            anyhow::bail!("tick duration must be positive");
        }
        if !self.listen.is_ipv4() {
            anyhow::bail!("listen address must be IPv4: {}", self.listen);
        }
        if let Some(introducer) = self.introducer {
            identity_of(introducer)?;
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of simulated nodes (node 1 is the introducer)
    #[arg(long, default_value = "10")]
    pub nodes: u32,

    /// Ticks to run
    #[arg(long, default_value = "100")]
    pub ticks: u64,

    /// Probability that any single message is lost
    #[arg(long, default_value = "0.0")]
    pub drop_rate: f64,

    /// Number of nodes to crash
    #[arg(long, default_value = "0")]
    pub fail: u32,

    /// Tick at which the crashes happen
    #[arg(long, default_value = "50")]
    pub fail_at: u64,

    /// RNG seed for loss and crash selection
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Write the final membership report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub protocol: ProtocolArgs,
}

impl SimulateArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.protocol.validate()?;
        if self.nodes == 0 {
            anyhow::bail!("at least one node is required");
        }
        if !(0.0..=1.0).contains(&self.drop_rate) {
            anyhow::bail!("drop rate must be within 0..=1, got {}", self.drop_rate);
        }
        if self.fail >= self.nodes {
            anyhow::bail!(
                "cannot crash {} of {} nodes (the introducer always survives)",
                self.fail,
                self.nodes
            );
        }
        Ok(())
    }
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            anyhow::bail!("log format must be 'pretty' or 'json'");
        }
        match &self.command {
            Command::Run(args) => args.validate(),
            Command::Simulate(args) => args.validate(),
        }
    }
}

/// Node identity for a UDP address
pub fn identity_of(addr: SocketAddr) -> anyhow::Result<NodeIdentity> {
    match addr {
        SocketAddr::V4(v4) => Ok(NodeIdentity::from(v4)),
        SocketAddr::V6(_) => anyhow::bail!("IPv6 addresses cannot be node identities: {}", addr),
    }
}

/// Settings for one membership engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Our identity
    pub identity: NodeIdentity,
    /// Well-known bootstrap identity
    pub introducer: NodeIdentity,
    /// Soft liveness threshold
    pub tfail: Tick,
    /// Hard eviction threshold
    pub tremove: Tick,
    /// Ticks between join attempts
    pub join_timeout: Tick,
    /// Join requests sent before giving up
    pub join_attempts: u32,
    /// Identities accepted in protocol traffic
    pub identity_space: IdentitySpace,
}

impl EngineConfig {
    pub fn new(identity: NodeIdentity, introducer: NodeIdentity) -> Self {
        Self {
            identity,
            introducer,
            tfail: DEFAULT_TFAIL,
            tremove: DEFAULT_TREMOVE,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            join_attempts: DEFAULT_JOIN_ATTEMPTS,
            identity_space: IdentitySpace::unbounded(),
        }
    }

    pub fn with_protocol(mut self, protocol: &ProtocolArgs) -> Self {
        self.tfail = protocol.tfail;
        self.tremove = protocol.tremove;
        self.join_timeout = protocol.join_timeout;
        self.join_attempts = protocol.join_attempts;
        self
    }

    pub fn with_identity_space(mut self, space: IdentitySpace) -> Self {
        self.identity_space = space;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_defaults() {
        let config = Config::parse_from(["memberd", "run"]);
        let Command::Run(args) = &config.command else {
            panic!("expected run");
        };
        assert_eq!(args.listen, "127.0.0.1:9100".parse::<SocketAddr>().unwrap());
        assert!(args.introducer.is_none());
        assert_eq!(args.protocol.tremove, DEFAULT_TREMOVE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_simulate() {
        let config = Config::parse_from([
            "memberd",
            "--log-format",
            "json",
            "simulate",
            "--nodes",
            "4",
            "--tremove",
            "5",
            "--tfail",
            "2",
            "--fail",
            "1",
        ]);
        let Command::Simulate(args) = &config.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.nodes, 4);
        assert_eq!(args.protocol.tremove, 5);
        assert_eq!(args.protocol.tfail, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_protocol_validation() {
        let mut protocol = ProtocolArgs::default();
        assert!(protocol.validate().is_ok());

        protocol.tfail = protocol.tremove + 1;
        assert!(protocol.validate().is_err());

        let protocol = ProtocolArgs {
            tremove: 0,
            tfail: 0,
            ..ProtocolArgs::default()
        };
        assert!(protocol.validate().is_err());

        let protocol = ProtocolArgs {
            join_attempts: 0,
            ..ProtocolArgs::default()
        };
        assert!(protocol.validate().is_err());
    }

    #[test]
    fn test_simulate_validation() {
        let config = Config::parse_from(["memberd", "simulate", "--nodes", "3", "--fail", "3"]);
        assert!(config.validate().is_err());

        let config = Config::parse_from(["memberd", "simulate", "--drop-rate", "1.5"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_log_format() {
        let config = Config::parse_from(["memberd", "--log-format", "xml", "run"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identity_of() {
        let id = identity_of("127.0.0.1:9100".parse().unwrap()).unwrap();
        assert_eq!(id, NodeIdentity::new(0x7f00_0001, 9100));
        assert!(identity_of("[::1]:9100".parse().unwrap()).is_err());
    }
}
