//! xprober server binary

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use xprober_common::logging::{self, LogFormat};
use xprober_common::signal;
use xprober_server::{Config, ProberServer, ServerSettings};

#[derive(Parser, Debug)]
#[command(name = "xprober-server")]
#[command(about = "Central target and aggregation server for xprober", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long = "config.file", default_value = "xprober.yml")]
    config_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log.level", default_value = "info")]
    log_level: String,

    /// Log format (logfmt, json)
    #[arg(long = "log.format", default_value = "logfmt")]
    log_format: String,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("xprober-server: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format: LogFormat = cli.log_format.parse()?;
    logging::init(&cli.log_level, format)?;

    let config = Config::load(&cli.config_file)
        .with_context(|| format!("loading {}", cli.config_file.display()))?;
    info!(
        path = %cli.config_file.display(),
        targets = config.prober_targets.len(),
        "configuration loaded"
    );

    let server = ProberServer::start(&config, &cli.config_file, ServerSettings::default())
        .await
        .context("starting server")?;

    signal::shutdown_signal().await;
    info!("shutdown signal received");

    server.stop().await;
    Ok(())
}
