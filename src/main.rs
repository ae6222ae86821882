//! routeforge daemon.
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!   upstream      │  resource watcher ─┐                         │
//!   (gateway or ──┼─▶                  ├──▶ store ──▶ generator ─┼──▶ dynamic.yml
//!    proxy API)   │  service watcher ──┘                         │     (proxy file provider)
//!                 └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use routeforge::config::load_config;
use routeforge::lifecycle::{signals, Engine, Shutdown};
use routeforge::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "routeforge")]
#[command(about = "Reconciles routing resources and publishes proxy dynamic configuration", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "routeforge.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_config(&cli.config)?;

    logging::init_logging(&settings.logging);
    tracing::info!(config = %cli.config.display(), "routeforge v{} starting", env!("CARGO_PKG_VERSION"));

    if settings.metrics.enabled {
        match settings.metrics.address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(e) => {
                tracing::error!(metrics_address = %settings.metrics.address, error = %e, "Failed to parse metrics address");
            }
        }
    }

    let engine = Engine::build(settings).await?;
    engine.start();

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown.clone());
    let reason = Shutdown::wait(stop).await;

    tracing::info!(%reason, "Shutting down");
    engine.stop();
    tracing::info!("Shutdown complete");
    Ok(())
}
