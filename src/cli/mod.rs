pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xprober")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query and poke an xprober server", long_about = None)]
pub struct Cli {
    /// Server control RPC address (host:port or :port)
    #[arg(short, long, global = true, default_value = ":6001")]
    pub server: String,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Show the targets the server hands to agents in a region")]
    Targets {
        #[arg(short, long, help = "Source region of the asking agent")]
        region: String,

        #[arg(long, default_value = "", help = "Source address of the asking agent")]
        ip: String,
    },
    #[command(about = "Send one agent heartbeat")]
    Report {
        #[arg(long, help = "Agent address")]
        ip: String,

        #[arg(short, long, help = "Agent region")]
        region: String,
    },
    #[command(about = "Push one synthetic probe result")]
    Push {
        #[arg(short, long, help = "Metric name, e.g. ping_latency_millonseconds")]
        metric: String,

        #[arg(long, help = "Measured value")]
        value: f64,

        #[arg(long, help = "Region the measurement was taken from")]
        source_region: String,

        #[arg(long, help = "Region of the measured target")]
        target_region: String,

        #[arg(short, long, help = "Measured address")]
        target: String,

        #[arg(long, help = "Probe type (icmp, http); derived from the metric name when omitted")]
        probe_type: Option<String>,

        #[arg(long, default_value = "xprober-cli", help = "Worker name stamped on the result")]
        worker: String,
    },
}
