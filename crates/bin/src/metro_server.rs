//! Metro - simulation server binary
//!
//! ```bash
//! metro-server                 # port and log file from config.toml
//! metro-server 5000 metro.log  # override both
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Metro simulation server
#[derive(Parser, Debug)]
#[command(name = "metro-server")]
#[command(about = "Autonomous metro train simulation with line-based telemetry")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    port: Option<u16>,

    /// Event log file (overrides the config file)
    log_file: Option<PathBuf>,

    /// Configuration file, created with defaults if missing
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    info!("Metro server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = server::Config::load(&args.config)?;
    // Command-line overrides
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(log_file) = args.log_file {
        config.log.file = log_file;
    }

    info!("Loaded configuration from {}", args.config.display());
    info!("  Port: {}", config.server.port);
    info!("  Stations: {}", config.simulation.stations);
    info!("  Event log: {}", config.log.file.display());

    // Start the server
    server::run(config).await
}
