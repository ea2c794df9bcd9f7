//! Shunt - UDP router for StatsD metrics
//!
//! Receives StatsD packets on a single UDP socket, classifies each
//! metric name against regex rules, and fans the raw line bytes out to
//! every healthy backend of every matching rule plus a master backend
//! that sees everything.
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (listener on 48125, control API on 48126)
//! shunt
//!
//! # Custom master node and faster health probing
//! shunt --master statsd-master:8125:8126 --check-interval 30
//!
//! # Push rules at runtime
//! curl -X POST localhost:48126/rules -d '{"rules": {"^frontend\\.": [
//!   {"host": "statsd-1", "port": 8125, "mgmt_port": 8126}]}}'
//! ```

mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use shunt_config::NodeSpec;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// UDP router for StatsD metrics
#[derive(Parser, Debug)]
#[command(name = "shunt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the rules file
    #[arg(long, default_value = "shunt-rules.json")]
    pub config: PathBuf,

    /// Address to bind the StatsD listener and the control API
    #[arg(long, default_value = "0.0.0.0")]
    pub bind_address: String,

    /// UDP port receiving StatsD metrics
    #[arg(long, default_value_t = 48125)]
    pub port: u16,

    /// TCP port serving the control API
    #[arg(long, default_value_t = 48126)]
    pub api_port: u16,

    /// Master node receiving every metric, as host:port:mgmt_port
    #[arg(long, default_value = "localhost:8125:8126")]
    pub master: String,

    /// Seconds between backend health probes
    #[arg(long, default_value_t = 180)]
    pub check_interval: u64,

    /// Enable debug logging and the packet-rate reporter
    #[arg(long)]
    pub debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;

    let master: NodeSpec = cli
        .master
        .parse()
        .context("invalid --master, expected host:port:mgmt_port")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        master = %master,
        rules_file = %cli.config.display(),
        "shunt starting"
    );

    server::run(cli, master).await?;

    info!("exit");
    Ok(())
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` overrides the level picked from `--debug`.
fn init_logging(debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow::anyhow!("invalid log filter: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    Ok(())
}
