//! Entry point for the interactive administrator shell.
//!
//! The shell dials the core, authenticates with an account name and
//! password, then maps interactive lines to management commands. Unlike the
//! wrapper and kickstarter it runs a single session: it exits when the
//! connection ends.

use std::io::BufRead;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Arg, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warden_client::{run_client, ClientConfig, RoleClient};
use warden_protocol::{ClientAuth, Protocol, Role};

mod commands;

struct ShellArgs {
    address: String,
    user: String,
    log_level: String,
}

fn parse_args() -> ShellArgs {
    let matches = Command::new("Warden Shell")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Interactive administrator shell for the Warden core")
        .arg(
            Arg::new("address")
                .short('a')
                .long("address")
                .value_name("HOST:PORT")
                .help("Core address")
                .default_value("localhost:26555"),
        )
        .arg(
            Arg::new("user")
                .short('u')
                .long("user")
                .value_name("NAME")
                .help("Account name for login")
                .required(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .get_matches();
    ShellArgs {
        address: matches
            .get_one::<String>("address")
            .expect("address has a default")
            .clone(),
        user: matches
            .get_one::<String>("user")
            .expect("user is required")
            .clone(),
        log_level: matches
            .get_one::<String>("log-level")
            .expect("log-level has a default")
            .clone(),
    }
}

/// The shell's role behavior: print replies, pump interactive input.
struct ShellRole {
    input: Mutex<Option<UnboundedReceiver<String>>>,
}

#[async_trait]
impl RoleClient for ShellRole {
    async fn on_open(&self, session: &Arc<Protocol>) {
        commands::register_reply_handlers(session);
        let Some(mut input) = self.input.lock().await.take() else {
            return;
        };
        let session = session.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = session.closed() => break,
                    line = input.recv() => match line {
                        Some(line) => commands::execute(&session, &line),
                        None => {
                            // Stdin closed: end the session cleanly.
                            session.request_close();
                            break;
                        }
                    }
                }
            }
        });
    }

    async fn on_close(&self) {}
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();

    // Replies print to stdout; logs stay on stderr.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    eprintln!("Password:");
    let mut password = String::new();
    std::io::stdin().read_line(&mut password)?;
    let password = password.trim_end_matches(['\r', '\n']).to_string();

    // Background reader: interactive lines flow through a channel so the
    // async side can select against session close.
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("Input-Reader".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        })?;

    let role = Arc::new(ShellRole {
        input: Mutex::new(Some(line_rx)),
    });
    let mut config = ClientConfig::new(
        args.address,
        Role::Shell,
        args.user,
        ClientAuth::password(password),
    );
    // One session per shell run; no reconnect loop.
    config.reconnect = false;

    match run_client(config, role).await {
        Ok(()) => {
            info!("Session ended");
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
