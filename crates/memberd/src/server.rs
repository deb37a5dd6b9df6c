//! memberd server - one membership engine on a UDP socket

use crate::clock::TickClock;
use crate::config::{identity_of, EngineConfig, RunArgs};
use crate::events::TracingEvents;
use crate::node::{EngineError, Node, NodeState, NodeStats};
use member_gossip_core::NodeIdentity;
use member_gossip_net::{TransportError, UdpTransport};
use parking_lot::Mutex;
use std::mem::discriminant;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Introducer {0} is not a valid node address")]
    BadIntroducer(SocketAddr),
    #[error("Introducer {0} never answered")]
    JoinFailed(NodeIdentity),
}

/// A bound daemon driving one node
pub struct Server {
    identity: NodeIdentity,
    introducer: NodeIdentity,
    local_addr: SocketAddr,
    tick: Duration,
    node: Mutex<Node>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: Mutex<Option<broadcast::Receiver<()>>>,
}

impl Server {
    /// Bind the socket and build the engine. Nothing is sent until [`Server::run`].
    pub async fn bind(args: &RunArgs) -> Result<Self, ServerError> {
        let transport = Arc::new(UdpTransport::bind(args.listen, args.queue_depth).await?);
        let identity = transport.identity();
        let local_addr = transport.local_addr();

        let introducer = match args.introducer {
            Some(addr) => identity_of(addr).map_err(|_| ServerError::BadIntroducer(addr))?,
            None => identity,
        };

        let clock = Arc::new(TickClock::new(Duration::from_millis(args.tick_ms)));
        let tick = clock.tick();
        let config = EngineConfig::new(identity, introducer).with_protocol(&args.protocol);
        let node = Node::new(config, transport, clock, Arc::new(TracingEvents));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        Ok(Self {
            identity,
            introducer,
            local_addr,
            tick,
            node: Mutex::new(node),
            shutdown_tx,
            shutdown_rx: Mutex::new(Some(shutdown_rx)),
        })
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current membership list
    pub fn members(&self) -> Vec<NodeIdentity> {
        self.node.lock().members()
    }

    pub fn stats(&self) -> NodeStats {
        self.node.lock().stats()
    }

    /// Bootstrap and tick until shut down. Returns the final counters.
    pub async fn run(&self) -> Result<NodeStats, ServerError> {
        let mut shutdown_rx = self
            .shutdown_rx
            .lock()
            .take()
            .unwrap_or_else(|| self.shutdown_tx.subscribe());

        if self.introducer == self.identity {
            info!("Starting memberd on {} as a new group", self.local_addr);
        } else {
            info!(
                "Starting memberd on {} (introducer {})",
                self.local_addr, self.introducer
            );
        }

        let mut last_state = {
            let mut node = self.node.lock();
            node.bootstrap()?;
            node.state()
        };

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let (state, members) = {
                        let mut node = self.node.lock();
                        node.step();
                        (node.state(), node.table().len())
                    };

                    if discriminant(&state) != discriminant(&last_state) {
                        info!(?state, members, "state changed");
                    }
                    last_state = state;

                    if state == NodeState::JoinFailed {
                        warn!("Could not join through {}", self.introducer);
                        return Err(ServerError::JoinFailed(self.introducer));
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutting down...");
                    break;
                }
            }
        }

        let mut node = self.node.lock();
        let stats = node.stats();
        node.shut_down();
        Ok(stats)
    }

    /// Stop a running server
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
