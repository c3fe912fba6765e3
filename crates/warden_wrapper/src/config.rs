//! Wrapper configuration: TOML on disk with a written default.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Configuration for one wrapper instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapperConfig {
    /// This instance's identity UUID, issued by the core
    pub uuid: String,
    /// The private key matching the identity's stored public key
    pub private_key: String,
    /// Command line used to launch the game server
    pub command: String,
    /// Directory the core may access through directory snapshots
    pub data_directory: String,
    /// Core connection settings
    pub connection: ConnectionSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Free-form table forwarded as the `Wrapper-Init` payload
    #[serde(default)]
    pub init: toml::Table,
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

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            uuid: String::new(),
            private_key: String::new(),
            command: "java -jar server.jar nogui".to_string(),
            data_directory: "Data".to_string(),
            connection: ConnectionSettings {
                address: "localhost:26555".to_string(),
            },
            logging: LoggingSettings::default(),
            init: toml::Table::new(),
        }
    }
}

impl WrapperConfig {
    /// Loads the configuration, writing the defaults when missing.
    pub async fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            Ok(toml::from_str(&content)?)
        } else {
            let default_config = WrapperConfig::default();
            tokio::fs::write(path, toml::to_string_pretty(&default_config)?).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// The init table as the JSON payload sent with `Wrapper-Init`.
    pub fn init_payload(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.init)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrapper.toml");
        let config = WrapperConfig::load_from_file(&path).await.unwrap();
        assert!(path.exists());
        assert!(config.uuid.is_empty());
        assert_eq!(config.connection.address, "localhost:26555");
    }

    #[tokio::test]
    async fn init_table_becomes_the_init_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrapper.toml");
        let text = r#"
uuid = "0b879175-8df2-45d3-9f59-543f31e59b4a"
private_key = "AAAA"
command = "java -jar server.jar nogui"
data_directory = "Data"

[connection]
address = "core.example:26555"

[init.auto_restart.daily]
from = "04:00"
to = "05:00"
"#;
        tokio::fs::write(&path, text).await.unwrap();
        let config = WrapperConfig::load_from_file(&path).await.unwrap();
        let payload = config.init_payload().unwrap();
        assert_eq!(payload["auto_restart"]["daily"]["from"], "04:00");
    }
}
