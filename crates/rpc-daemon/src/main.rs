//! Rich presence daemon entry point
//!
//! Run with:
//! ```bash
//! RPC_TOKEN=... cargo run -p rpc-daemon
//! ```
//!
//! Configuration is loaded from environment variables or a `.env` file.

use rpc_common::{try_init_tracing_with_config, AppConfig, AppError, TracingConfig};
use rpc_daemon::Daemon;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Configuration first, so the configured log level applies from the start
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(AppError::from(e).exit_code());
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::from_log_config(&config.log)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, code = e.error_code(), "Daemon stopped");
        std::process::exit(e.exit_code());
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    info!(
        detection = config.detection.enabled,
        custom_host = ?config.gateway.custom_host,
        proxy = config.gateway.proxy.is_some(),
        "Starting endcord-rpc"
    );

    Daemon::from_config(config)?.run().await?;

    info!("Stopped");
    Ok(())
}
