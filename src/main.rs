//! mqttd broker process.
//!
//! ```text
//!   config.toml ──▶ config ──▶ lifecycle ──▶ broker ◀── listeners
//!                                  ▲                    t1   (tcp)
//!                  SIGINT/SIGTERM ─┘                    tls1 (mutual TLS)
//!                                                       ws1  (web-socket)
//!                                                       stats (HTTP)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use mqttd::broker::{AllowHook, Server};
use mqttd::config::{load_config, DEFAULT_CONFIG_FILE};
use mqttd::lifecycle::{Lifecycle, TerminationSignals};
use mqttd::observability::logging;

#[derive(Parser)]
#[command(name = "mqttd", version, about = "Multi-protocol message broker")]
struct Cli {
    /// The config file path for the broker.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = load_config(&cli.config);
    logging::init(config.as_ref().ok().map(|c| c.log.level.as_str()));

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        listeners = config.enabled_listeners(),
        "mqttd starting"
    );

    let signals = match TerminationSignals::install() {
        Ok(signals) => signals,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    };
    let stop = async move {
        let signal = signals.recv().await;
        tracing::info!(signal, "Termination signal received");
    };

    let lifecycle = Lifecycle::<Server>::new(config, Arc::new(AllowHook), stop);
    match lifecycle.run().await {
        Ok(()) => {
            tracing::info!("mqttd finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "mqttd exiting with error");
            ExitCode::FAILURE
        }
    }
}
