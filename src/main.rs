use color_eyre::Result;
use tokio::sync::watch;
use tracing::{error, info};

use stellar_submitter::{
    bootstrap::initialize_manager, config::SubmitterConfig, jobs::spawn_shutdown_signal_handler,
    logging::setup_logging, metrics::gather_metrics,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // Load environment variables from .env file before logging reads LOG_*.
    dotenvy::dotenv().ok();
    setup_logging();

    let config = SubmitterConfig::from_env()?;
    info!(config = ?config, "configuration loaded");

    let manager = initialize_manager(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_handler = spawn_shutdown_signal_handler(shutdown_tx);

    manager.process_transactions(shutdown_rx).await;
    signal_handler.abort();

    if config.metrics_enabled {
        match gather_metrics() {
            Ok(buffer) => info!(metrics = %String::from_utf8_lossy(&buffer), "final metrics"),
            Err(e) => error!(error = %e, "failed to gather metrics"),
        }
    }

    info!("transaction submission service stopped");
    Ok(())
}
