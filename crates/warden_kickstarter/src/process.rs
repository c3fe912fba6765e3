//! Process lifecycle backends.
//!
//! A kickstarter starts, stops and restarts game-server instances through
//! one of two backends, selected by deployment mode: direct child processes
//! with inherited stdio, or service units driven through `systemctl --user`.
//! Callers must validate instance names before reaching a backend; the name
//! ends up inside a service-unit string or a working-directory path.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::info;

/// Errors from the process backends.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("service invocation failed: {0}")]
    Service(String),

    #[error("no launch command configured for server: {0}")]
    Unknown(String),
}

/// Start/stop/restart of one named game-server instance.
///
/// Implementations serialize operations so that start/stop/restart on the
/// same managed process never interleave.
#[async_trait]
pub trait ProcessBackend: Send + Sync {
    async fn start(&self, name: &str) -> Result<(), ProcessError>;

    async fn stop(&self, name: &str) -> Result<(), ProcessError>;

    /// Restart is stop immediately followed by start.
    async fn restart(&self, name: &str) -> Result<(), ProcessError> {
        self.stop(name).await?;
        self.start(name).await
    }
}

/// Backend driving service units: `systemctl --user <op> <unit>@<name>`.
pub struct ServiceBackend {
    unit: String,
}

impl ServiceBackend {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }

    async fn systemctl(&self, operation: &str, name: &str) -> Result<(), ProcessError> {
        let unit = format!("{}@{}", self.unit, name);
        info!("systemctl --user {operation} {unit}");
        let status = Command::new("systemctl")
            .args(["--user", operation, &unit])
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(ProcessError::Service(format!(
                "systemctl {operation} {unit} exited with {status}"
            )))
        }
    }
}

#[async_trait]
impl ProcessBackend for ServiceBackend {
    async fn start(&self, name: &str) -> Result<(), ProcessError> {
        self.systemctl("start", name).await
    }

    async fn stop(&self, name: &str) -> Result<(), ProcessError> {
        self.systemctl("stop", name).await
    }

    async fn restart(&self, name: &str) -> Result<(), ProcessError> {
        self.systemctl("restart", name).await
    }
}

/// Backend spawning game servers as direct child processes with inherited
/// stdio, one per configured instance name.
pub struct SubprocessBackend {
    servers_root: PathBuf,
    commands: HashMap<String, String>,
    running: Mutex<HashMap<String, Child>>,
}

impl SubprocessBackend {
    pub fn new(servers_root: PathBuf, commands: HashMap<String, String>) -> Self {
        Self {
            servers_root,
            commands,
            running: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ProcessBackend for SubprocessBackend {
    async fn start(&self, name: &str) -> Result<(), ProcessError> {
        let mut running = self.running.lock().await;
        if let Some(child) = running.get_mut(name) {
            if matches!(child.try_wait(), Ok(None)) {
                // Already live: start is a no-op.
                return Ok(());
            }
            running.remove(name);
        }
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| ProcessError::Unknown(name.to_string()))?;
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ProcessError::Unknown(name.to_string()))?;
        info!("Starting server: {command}");
        let child = Command::new(program)
            .args(parts)
            .current_dir(self.servers_root.join(name))
            .spawn()?;
        running.insert(name.to_string(), child);
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), ProcessError> {
        let mut running = self.running.lock().await;
        // The handle is cleared even when the process already exited.
        if let Some(mut child) = running.remove(name) {
            info!("Stopping server!");
            let _ = child.kill().await;
        }
        Ok(())
    }
}
