//! Error types for the Warden core.

/// Errors raised by the core server itself.
///
/// Session-level failures stay inside their session task; these errors are
/// for the server lifecycle around them.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-level failures (binding, listening).
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration problems discovered at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal failures (registry persistence, plugin host).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while loading or running plugins.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin could not be constructed.
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),

    /// Plugin failed while running.
    #[error("Plugin execution error: {0}")]
    ExecutionError(String),
}
