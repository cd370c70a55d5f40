//! Envelope Relay
//!
//! Carries TCP streams through a forward proxy disguised as HTTP requests.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌────────────────┐                       ┌────────────────┐
//!   Client ───────▶│    ingress     │── HTTP envelopes ────▶│     egress     │───────▶ Destination
//!          ◀───────│ wrap each chunk│◀──── verbatim ────────│ unwrap, route  │◀───────
//!                  └────────────────┘   (forward proxy)     └───────┬────────┘
//!                                                                   │ non-conforming
//!                                                                   ▼
//!                                                            Reverse-proxy target
//! ```
//!
//! Both relays can run in one process (the default loopback setup) or
//! on separate hosts with a forward proxy in between.

use std::path::PathBuf;

use clap::Parser;

use envelope_relay::config::{load_config, RelayConfig};
use envelope_relay::lifecycle::{self, signals};
use envelope_relay::observability::logging;

#[derive(Parser)]
#[command(name = "envelope-relay")]
#[command(version, about = "Two-hop TCP tunnel over HTTP-looking envelopes", long_about = None)]
struct Cli {
    /// TOML configuration file. Without one, both relays run on loopback.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::loopback(),
    };

    logging::init(&config.observability);

    if cli.check {
        tracing::info!(
            ingress = config.ingress.is_some(),
            egress = config.egress.is_some(),
            "Configuration is valid"
        );
        return Ok(());
    }

    tracing::info!("envelope-relay v{} starting", env!("CARGO_PKG_VERSION"));

    let handle = lifecycle::start(config).await?;
    signals::shutdown_signal().await;
    handle.shutdown().await;

    Ok(())
}
