//! Entry point for the Warden core binary.
//!
//! Loads configuration, initializes logging, starts the server and runs
//! until a termination signal or an escalated crash. A crash report is the
//! only path that exits nonzero.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warden_core::cli::CliArgs;
use warden_core::shutdown::{crash_channel, setup_shutdown_handler};
use warden_core::{AppConfig, WardenServer};

fn setup_logging(level: &str, json_format: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json_format {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_ansi(true)).init();
    }
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path).await?;
    if let Some(bind_address) = args.bind_address {
        config.server.bind_address = bind_address;
    }
    if let Some(data_directory) = args.data_directory {
        config.server.data_directory = data_directory.to_string_lossy().to_string();
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if let Err(e) = config.validate() {
        return Err(format!("Configuration validation failed: {e}").into());
    }

    setup_logging(&config.logging.level, config.logging.json_format)?;
    info!("Warden Core v{}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", args.config_path.display());

    let (crash, mut crash_rx) = crash_channel();
    let server = Arc::new(WardenServer::new(config.to_server_config()?, crash)?);

    let server_handle = {
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("Server error: {e}");
                std::process::exit(1);
            }
        })
    };

    let shutdown_rx = setup_shutdown_handler().await;
    let crashed = tokio::select! {
        _ = shutdown_rx => {
            info!("Initiating graceful shutdown...");
            false
        }
        reason = crash_rx.recv() => {
            if let Some(reason) = reason {
                error!("Stopping due to a crash: {reason}");
            }
            true
        }
    };

    server.shutdown();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), server_handle).await;

    if crashed {
        std::process::exit(1);
    }
    info!("Warden core shutdown complete");
    Ok(())
}
