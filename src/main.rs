use clap::Parser;
use std::process;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;
use xprober::cli::{commands, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error: setting tracing subscriber: {e}");
        process::exit(1);
    }

    debug!("xprober v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = commands::handle_command(&cli.server, cli.command).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
