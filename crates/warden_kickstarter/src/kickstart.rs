//! The kickstarter's command surface and the server-name gate.
//!
//! Every name arriving over the wire is about to be interpolated into a
//! service-unit string or a filesystem path, so it is validated twice
//! before any process primitive runs: strictly alphanumeric, and naming an
//! existing, non-hidden directory under the managed-servers root. Anything
//! else is rejected outright, with nothing echoed back about why.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use warden_client::directory::register_directory_access;
use warden_client::RoleClient;
use warden_protocol::Protocol;

use crate::process::ProcessBackend;

/// Whether a server name is safe to act on.
///
/// Only ASCII letters and digits pass, and the named directory must exist
/// under `servers_root` and not be hidden.
pub fn check_server(name: &str, servers_root: &Path) -> bool {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    let server_dir = servers_root.join(name);
    server_dir.is_dir() && !is_hidden(&server_dir)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(OsStr::to_str)
        .map(|name| name.starts_with('.'))
        .unwrap_or(true)
}

/// Non-hidden server directories under the managed-servers root, sorted.
pub fn list_servers(servers_root: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(servers_root) else {
        return Vec::new();
    };
    let mut servers: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .collect();
    servers.sort();
    servers
}

/// The kickstarter's role behavior in the shared client state machine.
pub struct KickstarterRole {
    servers_root: PathBuf,
    backend: Arc<dyn ProcessBackend>,
}

impl KickstarterRole {
    pub fn new(servers_root: PathBuf, backend: Arc<dyn ProcessBackend>) -> Self {
        Self {
            servers_root,
            backend,
        }
    }

    fn register_lifecycle(&self, session: &Arc<Protocol>, command: &'static str) {
        let servers_root = self.servers_root.clone();
        let backend = self.backend.clone();
        session.add_command(command, move |_, payload| {
            let Some(name) = payload.get("name").and_then(Value::as_str) else {
                return Ok(());
            };
            if !check_server(name, &servers_root) {
                debug!("Rejected {command} for invalid server name");
                return Ok(());
            }
            let backend = backend.clone();
            let name = name.to_string();
            tokio::spawn(async move {
                let result = match command {
                    "Start" => backend.start(&name).await,
                    "Stop" => backend.stop(&name).await,
                    _ => backend.restart(&name).await,
                };
                if let Err(e) = result {
                    warn!("{command} {name} failed: {e}");
                }
            });
            Ok(())
        });
    }
}

#[async_trait]
impl RoleClient for KickstarterRole {
    async fn on_open(&self, session: &Arc<Protocol>) {
        {
            let servers_root = self.servers_root.clone();
            session.add_command("List", move |proto, _| {
                let proto = proto.clone();
                let servers_root = servers_root.clone();
                tokio::spawn(async move {
                    let servers = tokio::task::spawn_blocking(move || list_servers(&servers_root))
                        .await
                        .unwrap_or_default();
                    let servers: Vec<Value> = servers
                        .into_iter()
                        .map(|name| json!({ "name": name }))
                        .collect();
                    proto.send("List", json!({ "servers": servers }));
                });
                Ok(())
            });
        }
        self.register_lifecycle(session, "Start");
        self.register_lifecycle(session, "Stop");
        self.register_lifecycle(session, "Restart");
        register_directory_access(session, self.servers_root.clone());
    }

    async fn on_close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_outside_alphanumeric_are_rejected_before_any_backend_call() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("survival")).unwrap();

        assert!(check_server("survival", dir.path()));
        for bad in [
            "",
            "a b",
            "a;rm -rf /",
            "../survival",
            "surv/ival",
            "serv.er",
            "name-with-dash",
            "ünicode",
            "$(reboot)",
            "a\nb",
        ] {
            assert!(!check_server(bad, dir.path()), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn valid_name_still_needs_an_existing_visible_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("visible")).unwrap();
        // A hidden directory never passes, even with a clean name. The name
        // cannot itself start with a dot (not alphanumeric), so hide it one
        // level differently: the check is on the resolved directory.
        std::fs::write(dir.path().join("afile"), b"not a dir").unwrap();

        assert!(check_server("visible", dir.path()));
        assert!(!check_server("missing", dir.path()));
        assert!(!check_server("afile", dir.path()));
    }

    #[test]
    fn listing_skips_hidden_directories_and_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("alpha")).unwrap();
        std::fs::create_dir(dir.path().join("beta")).unwrap();
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();
        std::fs::write(dir.path().join("stray.txt"), b"x").unwrap();

        assert_eq!(list_servers(dir.path()), vec!["alpha", "beta"]);
    }
}
