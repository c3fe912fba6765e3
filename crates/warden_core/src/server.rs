//! The central authority server.
//!
//! `WardenServer` owns the control-plane state, the plugin host and the
//! accept loop. It provides infrastructure only: identity storage, session
//! classification and registration, command routing. Everything with policy
//! in it (the admin surface, restart scheduling) lives in plugins.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use warden_protocol::ProtocolError;

use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::ServerError;
use crate::identity::IdentityRegistry;
use crate::plane::ControlPlane;
use crate::plugins::{default_providers, PluginHost};
use crate::registry::SessionRegistry;
use crate::shutdown::CrashHandler;

/// The core server: registries, plugin host and accept loop.
pub struct WardenServer {
    config: ServerConfig,
    plane: Arc<ControlPlane>,
    plugins: Arc<PluginHost>,
    shutdown_sender: broadcast::Sender<()>,
}

impl WardenServer {
    /// Builds the server: opens the identity snapshot, creates the session
    /// registry and loads the built-in plugins.
    pub fn new(config: ServerConfig, crash: CrashHandler) -> Result<Self, ServerError> {
        std::fs::create_dir_all(&config.data_directory)
            .map_err(|e| ServerError::Internal(format!("cannot create data directory: {e}")))?;
        let identities =
            IdentityRegistry::open(config.data_directory.join("identities.json"))
                .map_err(|e| ServerError::Internal(format!("cannot open identity registry: {e}")))?;
        let plane = ControlPlane::new(
            Arc::new(identities),
            SessionRegistry::new(),
            config.admins.clone(),
            crash,
        );
        let plugins = PluginHost::load(default_providers(), &plane, &config.plugin_config);
        let (shutdown_sender, _) = broadcast::channel(1);

        info!(
            "Loaded {} plugin(s): {:?}",
            plugins.count(),
            plugins.names()
        );
        info!("{} identities on file", plane.identities.len());

        Ok(Self {
            config,
            plane,
            plugins,
            shutdown_sender,
        })
    }

    /// The shared control-plane handle.
    pub fn plane(&self) -> &Arc<ControlPlane> {
        &self.plane
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("bind failed: {e}")))?;
        self.serve(listener).await
    }

    /// Serves connections from an already-bound listener until shutdown.
    ///
    /// One task per accepted transport; a failing session never takes the
    /// accept loop down, a failing accept loop escalates to the crash
    /// handler.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))?;
        info!("🚀 Warden core listening on {local_addr}");

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let plane = self.plane.clone();
                            let plugins = self.plugins.clone();
                            tokio::spawn(async move {
                                match handle_connection(stream, addr, plane, plugins).await {
                                    Ok(()) => debug!("{addr}: session ended"),
                                    Err(ProtocolError::AuthRejected) => {
                                        info!("{addr}: authentication rejected");
                                    }
                                    Err(ProtocolError::ConnectionClosed | ProtocolError::Io(_)) => {
                                        debug!("{addr}: connection dropped");
                                    }
                                    Err(e) => warn!("{addr}: session error: {e}"),
                                }
                            });
                        }
                        Err(e) => {
                            self.plane.crash().report("Accept-Loop", e);
                            break;
                        }
                    }
                }
                _ = shutdown_receiver.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.plugins.dispose();
        info!("Server stopped");
        Ok(())
    }

    /// Initiates a graceful shutdown of the accept loop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_sender.send(());
    }
}
