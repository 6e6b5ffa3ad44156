//! Metro - terminal client binary

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Terminal client for the metro server
#[derive(Parser, Debug)]
#[command(name = "metro-client")]
#[command(version)]
struct Args {
    /// Server host
    host: String,

    /// Server port
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Diagnostics go to stderr so they never mix with server lines.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    client::run(&format!("{}:{}", args.host, args.port)).await
}
