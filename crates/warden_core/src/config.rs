//! Core configuration: TOML on disk, validated, with CLI overrides.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ServerError;

/// Application configuration loaded from the TOML config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
    /// Admin accounts for shell logins: name -> password
    #[serde(default)]
    pub admins: BTreeMap<String, String>,
    /// Per-plugin configuration sub-tables, keyed by plugin name
    #[serde(default)]
    pub plugins: toml::Table,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address
    pub bind_address: String,
    /// Directory holding the identity snapshot and other persistent state
    pub data_directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter
    pub level: String,
    /// JSON formatting
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:26555".to_string(),
                data_directory: "data".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            admins: BTreeMap::new(),
            plugins: toml::Table::new(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a file, writing the defaults when missing.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, ServerError> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
            toml::from_str(&content)
                .map_err(|e| ServerError::Config(format!("cannot parse {}: {e}", path.display())))
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)
                .map_err(|e| ServerError::Config(e.to_string()))?;
            tokio::fs::write(path, toml_content)
                .await
                .map_err(|e| ServerError::Config(format!("cannot write {}: {e}", path.display())))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", self.server.bind_address));
        }
        if self.server.data_directory.is_empty() {
            return Err("Data directory cannot be empty".to_string());
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            ));
        }
        Ok(())
    }

    /// Converts to the runtime server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, ServerError> {
        Ok(ServerConfig {
            bind_address: self
                .server
                .bind_address
                .parse()
                .map_err(|e| ServerError::Config(format!("invalid bind address: {e}")))?,
            data_directory: PathBuf::from(&self.server.data_directory),
            admins: self.admins.clone().into_iter().collect(),
            plugin_config: serde_json::to_value(&self.plugins)
                .map_err(|e| ServerError::Config(format!("invalid plugin config: {e}")))?,
        })
    }
}

/// Runtime configuration for [`crate::server::WardenServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the accept loop binds.
    pub bind_address: SocketAddr,
    /// Directory holding persistent state (identity snapshot).
    pub data_directory: PathBuf,
    /// Admin accounts for shell logins.
    pub admins: HashMap<String, String>,
    /// The `[plugins]` table as JSON, sub-sectioned per plugin name.
    pub plugin_config: serde_json::Value,
}
