//! xprober-agent - probing agent
//!
//! The agent:
//! - Discovers its own region and address
//! - Connects to the server's control RPC endpoint
//! - Probes whatever targets the server assigns and pushes the results

use anyhow::{Context, Result};
use clap::Parser;
use std::process;
use std::sync::Arc;
use tracing::info;
use xprober_agent::probe::ProberRegistry;
use xprober_agent::{metadata, Agent, AgentSettings, RpcClient};
use xprober_common::logging::{self, LogFormat};
use xprober_common::signal;

#[derive(Parser)]
#[command(name = "xprober-agent")]
#[command(version)]
#[command(about = "Network reachability probing agent", long_about = None)]
struct Cli {
    /// Server control RPC address (host:port or :port)
    #[arg(long = "grpc.server-address", default_value = ":6001")]
    server_address: String,

    /// Region to report instead of querying instance metadata
    #[arg(long = "agent.region")]
    region: Option<String>,

    /// Address to report instead of the first non-loopback IPv4 address
    #[arg(long = "agent.ip")]
    ip: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log.level", default_value = "info")]
    log_level: String,

    /// Log format (logfmt, json)
    #[arg(long = "log.format", default_value = "logfmt")]
    log_format: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let format: LogFormat = cli.log_format.parse()?;
    logging::init(&cli.log_level, format)?;

    info!(version = env!("CARGO_PKG_VERSION"), "xprober-agent starting");

    let identity = metadata::discover(cli.region, cli.ip)
        .await
        .context("resolving agent region and address")?;

    let settings = AgentSettings::default();
    let client = RpcClient::connect(&cli.server_address, settings.rpc_timeout)
        .await
        .with_context(|| format!("connecting to server at {}", cli.server_address))?;

    let mut agent = Agent::new(
        identity,
        settings,
        Arc::new(client),
        ProberRegistry::with_defaults(),
    );
    agent.start();

    signal::shutdown_signal().await;

    agent.stop().await;
    info!("xprober-agent stopped");
    Ok(())
}
