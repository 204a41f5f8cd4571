use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use meterread::config::TransportKind;
use meterread::transport::ble::BleUartConnector;
use meterread::transport::sim::SimulatedConnector;
use meterread::transport::Connector;
use meterread::{Config, Poller, TracingSink};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "meterread",
    about = "Poll UM24C/UM25C power meters and log their readings"
)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used without one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma separated device names, replacing the configured list.
    #[arg(long)]
    devices: Option<String>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                Config::load(path).with_context(|| format!("loading {}", path.display()))?
            }
            None => Config::default(),
        };
        if let Some(devices) = self.devices {
            config.poller.devices = devices;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;

    let stop = CancellationToken::new();
    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted");
            }
            stop.cancel();
        }
    });

    match config.transport.kind {
        TransportKind::Ble => {
            run(BleUartConnector::new(config.transport.scan_timeout()), config, stop).await
        }
        TransportKind::Simulated => run(SimulatedConnector::default(), config, stop).await,
    }
    Ok(())
}

async fn run<C: Connector + Clone>(connector: C, config: Config, stop: CancellationToken) {
    let poller = Poller::new(connector, Arc::new(TracingSink), config.session, config.poller);
    poller.run(stop).await;
}
