//! In-process cluster simulation
//!
//! Many isolated nodes share one lossy [`SimNetwork`], one [`ManualClock`]
//! and one [`RecordedEvents`] log. Node `i` has identity `{host_id: i,
//! port: 0}` and node 1 is the introducer. Each simulated tick advances the
//! clock once and steps every node in identity order; nodes only ever see
//! each other through encoded messages.

use crate::clock::{Clock, ManualClock};
use crate::config::{EngineConfig, ProtocolArgs, SimulateArgs};
use crate::events::RecordedEvents;
use crate::node::{EngineError, Node, NodeState, NodeStats};
use member_gossip_core::{IdentitySpace, MembershipEntry, NodeIdentity, Tick};
use member_gossip_net::SimNetwork;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Simulation errors
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("No simulated node {0}")]
    UnknownNode(NodeIdentity),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Report serialization error: {0}")]
    Report(#[from] serde_json::Error),
}

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub nodes: u32,
    pub drop_rate: f64,
    pub seed: u64,
    pub protocol: ProtocolArgs,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            drop_rate: 0.0,
            seed: 0,
            protocol: ProtocolArgs::default(),
        }
    }
}

impl From<&SimulateArgs> for SimulationConfig {
    fn from(args: &SimulateArgs) -> Self {
        Self {
            nodes: args.nodes,
            drop_rate: args.drop_rate,
            seed: args.seed,
            protocol: args.protocol.clone(),
        }
    }
}

/// A simulated cluster
pub struct Simulation {
    config: SimulationConfig,
    network: Arc<SimNetwork>,
    clock: Arc<ManualClock>,
    events: Arc<RecordedEvents>,
    nodes: BTreeMap<NodeIdentity, Node>,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        let network = Arc::new(SimNetwork::new(config.seed).with_drop_rate(config.drop_rate));
        let clock = Arc::new(ManualClock::new(0));
        let events = Arc::new(RecordedEvents::new());
        let space = IdentitySpace::new(1..=config.nodes.max(1));

        let nodes = (1..=config.nodes)
            .map(|n| {
                let identity = Self::identity(n);
                let engine = EngineConfig::new(identity, Self::introducer())
                    .with_protocol(&config.protocol)
                    .with_identity_space(space.clone());
                let node = Node::new(engine, network.clone(), clock.clone(), events.clone());
                (identity, node)
            })
            .collect();

        Self {
            config,
            network,
            clock,
            events,
            nodes,
        }
    }

    /// Identity of simulated node `n`
    pub fn identity(n: u32) -> NodeIdentity {
        NodeIdentity::new(n, 0)
    }

    pub fn introducer() -> NodeIdentity {
        Self::identity(1)
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Bootstrap one node
    pub fn start(&mut self, identity: NodeIdentity) -> Result<(), SimulationError> {
        let node = self
            .nodes
            .get_mut(&identity)
            .ok_or(SimulationError::UnknownNode(identity))?;
        node.bootstrap()?;
        Ok(())
    }

    /// Bootstrap every node, introducer first
    pub fn start_all(&mut self) -> Result<(), SimulationError> {
        for node in self.nodes.values_mut() {
            node.bootstrap()?;
        }
        Ok(())
    }

    /// Advance one tick and step every node
    pub fn tick(&mut self) -> Tick {
        let now = self.clock.advance(1);
        for (identity, node) in self.nodes.iter_mut() {
            if node.state() == NodeState::Failed {
                self.network.clear_inbox(identity);
                continue;
            }
            node.step();
        }
        now
    }

    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Crash a node: it stops sending and its pending traffic is lost
    pub fn fail(&mut self, identity: NodeIdentity) -> Result<(), SimulationError> {
        let node = self
            .nodes
            .get_mut(&identity)
            .ok_or(SimulationError::UnknownNode(identity))?;
        node.shut_down();
        self.network.clear_inbox(&identity);
        info!(node = %identity, tick = self.clock.now(), "simulated crash");
        Ok(())
    }

    /// Pick `count` distinct non-introducer nodes at random
    pub fn pick_victims(&self, count: usize) -> Vec<NodeIdentity> {
        let mut candidates: Vec<_> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| *id != Self::introducer())
            .collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        candidates.shuffle(&mut rng);
        candidates.truncate(count);
        candidates.sort();
        candidates
    }

    pub fn node(&self, identity: NodeIdentity) -> Option<&Node> {
        self.nodes.get(&identity)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn events(&self) -> &RecordedEvents {
        &self.events
    }

    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    /// Snapshot of every node's view
    pub fn report(&self) -> SimulationReport {
        let stats = self.network.stats();
        SimulationReport {
            tick: self.clock.now(),
            network: NetworkSummary {
                sent: stats.sent,
                dropped: stats.dropped,
                delivered: stats.delivered,
            },
            events: self.events.len(),
            nodes: self
                .nodes
                .values()
                .map(|node| NodeReport {
                    identity: node.identity(),
                    stats: node.stats(),
                    members: node.table().snapshot(),
                })
                .collect(),
        }
    }
}

/// Network counters in a report
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NetworkSummary {
    pub sent: u64,
    pub dropped: u64,
    pub delivered: u64,
}

/// One node's view in a report
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub identity: NodeIdentity,
    pub stats: NodeStats,
    pub members: Vec<MembershipEntry>,
}

/// Final state of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub tick: Tick,
    pub network: NetworkSummary,
    pub events: usize,
    pub nodes: Vec<NodeReport>,
}

impl SimulationReport {
    /// Identities of nodes that are full members
    pub fn live(&self) -> BTreeSet<NodeIdentity> {
        self.nodes
            .iter()
            .filter(|n| n.stats.state == NodeState::InGroup)
            .map(|n| n.identity)
            .collect()
    }

    /// Every live node lists exactly the other live nodes
    pub fn converged(&self) -> bool {
        let live = self.live();
        self.nodes
            .iter()
            .filter(|n| live.contains(&n.identity))
            .all(|n| {
                let seen: BTreeSet<_> = n.members.iter().map(|e| e.identity).collect();
                let mut expected = live.clone();
                expected.remove(&n.identity);
                seen == expected
            })
    }

    pub fn write_json(&self, path: &Path) -> Result<(), SimulationError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Run the `simulate` command end to end.
pub fn simulate(args: &SimulateArgs) -> Result<SimulationReport, SimulationError> {
    let mut sim = Simulation::new(SimulationConfig::from(args));
    let victims = sim.pick_victims(args.fail as usize);

    info!(
        nodes = args.nodes,
        ticks = args.ticks,
        drop_rate = args.drop_rate,
        crashes = victims.len(),
        "starting simulation"
    );

    sim.start_all()?;
    for _ in 0..args.ticks {
        if sim.now() == args.fail_at {
            for victim in &victims {
                sim.fail(*victim)?;
            }
        }
        sim.tick();
    }

    let report = sim.report();
    info!(
        tick = report.tick,
        live = report.live().len(),
        converged = report.converged(),
        sent = report.network.sent,
        dropped = report.network.dropped,
        events = report.events,
        "simulation finished"
    );

    if let Some(path) = &args.report {
        report.write_json(path)?;
        info!("report written to {}", path.display());
    }

    Ok(report)
}
