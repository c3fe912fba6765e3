//! Kickstarter configuration: TOML on disk with a written default.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Which process primitive this kickstarter drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Direct child processes with inherited stdio.
    Subprocess,
    /// Service units via `systemctl --user`.
    Service,
}

/// Configuration for one kickstarter instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickstarterConfig {
    /// This instance's identity UUID, issued by the core
    pub uuid: String,
    /// The private key matching the identity's stored public key
    pub private_key: String,
    /// Root directory holding one subdirectory per managed server
    pub servers_directory: String,
    /// Deployment mode selecting the process backend
    pub mode: DeploymentMode,
    /// Service unit name (service mode); invoked as `<service>@<name>`
    #[serde(default = "default_service")]
    pub service: String,
    /// Core connection settings
    pub connection: ConnectionSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Per-server launch commands (subprocess mode)
    #[serde(default)]
    pub servers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Core address in `host:port` form
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_service() -> String {
    "mcserver".to_string()
}

impl Default for KickstarterConfig {
    fn default() -> Self {
        Self {
            uuid: String::new(),
            private_key: String::new(),
            servers_directory: "Servers".to_string(),
            mode: DeploymentMode::Service,
            service: default_service(),
            connection: ConnectionSettings {
                address: "localhost:26555".to_string(),
            },
            logging: LoggingSettings::default(),
            servers: BTreeMap::new(),
        }
    }
}

impl KickstarterConfig {
    /// Loads the configuration, writing the defaults when missing.
    pub async fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            Ok(toml::from_str(&content)?)
        } else {
            let default_config = KickstarterConfig::default();
            tokio::fs::write(path, toml::to_string_pretty(&default_config)?).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subprocess_mode_carries_per_server_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kickstarter.toml");
        let text = r#"
uuid = "0b879175-8df2-45d3-9f59-543f31e59b4a"
private_key = "AAAA"
servers_directory = "Servers"
mode = "subprocess"

[connection]
address = "core.example:26555"

[servers]
survival = "java -jar server.jar nogui"
"#;
        tokio::fs::write(&path, text).await.unwrap();
        let config = KickstarterConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.mode, DeploymentMode::Subprocess);
        assert_eq!(
            config.servers.get("survival").map(String::as_str),
            Some("java -jar server.jar nogui")
        );
        // The service field keeps its default for mixed configs.
        assert_eq!(config.service, "mcserver");
    }

    #[tokio::test]
    async fn missing_file_is_created_with_service_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kickstarter.toml");
        let config = KickstarterConfig::load_from_file(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.mode, DeploymentMode::Service);
    }
}
