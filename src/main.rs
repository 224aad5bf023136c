//! chunk-relay binary.
//!
//! Loads configuration, applies command-line overrides, then serves until
//! SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use chunk_relay::config::{read_config, validate_config, ConfigError, RelayConfig};
use chunk_relay::lifecycle::wait_for_signal;
use chunk_relay::net::Listener;
use chunk_relay::observability::{logging, metrics};
use chunk_relay::RelayServer;

#[derive(Debug, Parser)]
#[command(name = "chunk-relay", version, about = "Re-frame chunked HTTP bodies through a block transform")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address, overrides listener.bind_address
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Target address, overrides target.address
    #[arg(long, value_name = "ADDR")]
    target: Option<String>,

    /// Log level when RUST_LOG is unset, overrides observability.log_level
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut RelayConfig) {
        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(target) = self.target {
            config.target.address = target;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut cli = Cli::parse();

    let mut config = match cli.config.take() {
        Some(path) => read_config(&path)?,
        None => RelayConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "chunk-relay starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        target_addr = %config.target.address,
        transform = config.transform.name(),
        block_size = config.pipeline.block_size,
        outbound_chunk_size = config.pipeline.outbound_chunk_size,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = RelayServer::new(config);

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
