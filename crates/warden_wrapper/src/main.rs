//! Entry point for the wrapper binary.
//!
//! The wrapper launches the game server as a child process, turns its
//! console output into semantic events for the core, feeds relayed commands
//! back into its stdin, and keeps reconnecting to the core for as long as
//! the game server runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Arg, Command};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use warden_client::{run_client, ClientConfig};
use warden_protocol::{decode_signing_key, ClientAuth, Role};

mod bridge;
mod config;
mod logparse;
mod process;

use bridge::{install_rules, CoreLink, WrapperRole};
use config::WrapperConfig;
use logparse::LineMatcher;
use process::spawn_game_server;

fn parse_args() -> PathBuf {
    let matches = Command::new("Warden Wrapper")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Wraps a game-server process and reports to the Warden core")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("wrapper.toml"),
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
    let config = WrapperConfig::load_from_file(&config_path).await?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let uuid = Uuid::parse_str(&config.uuid).context("No valid UUID in config")?;
    let private_key =
        decode_signing_key(&config.private_key).context("Error decoding private key")?;
    let data_directory = PathBuf::from(&config.data_directory);
    tokio::fs::create_dir_all(&data_directory)
        .await
        .with_context(|| format!("cannot create data directory {}", data_directory.display()))?;

    // Console plumbing: rules feed the attached session, commands feed the
    // child's stdin.
    let link = Arc::new(CoreLink::new());
    let (console_tx, console_rx) = mpsc::unbounded_channel();
    let mut matcher = LineMatcher::new();
    install_rules(&mut matcher, link.clone(), console_tx.clone())
        .context("invalid console rule pattern")?;

    spawn_game_server(&config.command, Path::new("."), matcher, console_rx)?;

    let role = Arc::new(WrapperRole::new(
        link,
        console_tx,
        config.init_payload()?,
        data_directory,
    ));
    let client_config = ClientConfig::new(
        config.connection.address.clone(),
        Role::Wrapper,
        uuid.to_string(),
        ClientAuth::key_pair(private_key),
    );
    run_client(client_config, role).await?;
    Ok(())
}
