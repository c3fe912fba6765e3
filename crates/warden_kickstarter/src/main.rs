//! Entry point for the kickstarter binary.
//!
//! A kickstarter sits on a host with game-server instances and carries out
//! start/stop/restart requests relayed through the core, reconnecting for
//! as long as it runs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Arg, Command};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use warden_client::{run_client, ClientConfig};
use warden_protocol::{decode_signing_key, ClientAuth, Role};

mod config;
mod kickstart;
mod process;

use config::{DeploymentMode, KickstarterConfig};
use kickstart::KickstarterRole;
use process::{ProcessBackend, ServiceBackend, SubprocessBackend};

fn parse_args() -> PathBuf {
    let matches = Command::new("Warden Kickstarter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Supervises game-server instances for the Warden core")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("kickstarter.toml"),
        )
        .get_matches();
    PathBuf::from(
        matches
            .get_one::<String>("config")
            .expect("Default config path should always be set"),
    )
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let config_path = parse_args();
    let config = KickstarterConfig::load_from_file(&config_path).await?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let uuid = Uuid::parse_str(&config.uuid).context("No valid UUID in config")?;
    let private_key =
        decode_signing_key(&config.private_key).context("Error decoding private key")?;
    let servers_root = PathBuf::from(&config.servers_directory);
    tokio::fs::create_dir_all(&servers_root)
        .await
        .with_context(|| format!("cannot create servers directory {}", servers_root.display()))?;

    let backend: Arc<dyn ProcessBackend> = match config.mode {
        DeploymentMode::Service => Arc::new(ServiceBackend::new(config.service.clone())),
        DeploymentMode::Subprocess => Arc::new(SubprocessBackend::new(
            servers_root.clone(),
            config.servers.clone().into_iter().collect(),
        )),
    };

    let role = Arc::new(KickstarterRole::new(servers_root, backend));
    let client_config = ClientConfig::new(
        config.connection.address.clone(),
        Role::Kickstarter,
        uuid.to_string(),
        ClientAuth::key_pair(private_key),
    );
    run_client(client_config, role).await?;
    Ok(())
}
