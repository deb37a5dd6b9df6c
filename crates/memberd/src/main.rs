//! memberd - heartbeat gossip membership daemon
//!
//! `memberd run` keeps one member alive over UDP; `memberd simulate` runs a
//! whole cluster in-process and reports how its views converged.

use clap::Parser;
use memberd::config::{Command, Config, RunArgs, SimulateArgs};
use memberd::server::Server;
use memberd::sim::simulate;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("memberd=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    info!("memberd v{}", env!("CARGO_PKG_VERSION"));

    let result = match &config.command {
        Command::Run(args) => run(args).await,
        Command::Simulate(args) => run_simulation(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &RunArgs) -> anyhow::Result<()> {
    let server = Arc::new(Server::bind(args).await?);

    tokio::spawn({
        let server = server.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                server.shutdown();
            }
        }
    });

    let stats = server.run().await?;
    info!(
        members = stats.members,
        heartbeat = stats.heartbeat,
        sent = stats.messages_sent,
        received = stats.messages_received,
        rejected = stats.messages_rejected,
        "memberd stopped"
    );
    Ok(())
}

fn run_simulation(args: &SimulateArgs) -> anyhow::Result<()> {
    let report = simulate(args)?;
    if !report.converged() {
        error!("membership views did not converge by tick {}", report.tick);
    }
    Ok(())
}
