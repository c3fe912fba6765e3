//! # Warden Core
//!
//! The central authority of the Warden control plane. A single core accepts
//! authenticated connections from three kinds of remote agents speaking the
//! shared named-command protocol:
//!
//! * **Wrappers** report logs, chat and roster changes from a running
//!   game-server process and accept relayed commands.
//! * **Kickstarters** supervise game-server instances on a host and carry
//!   out start/stop/restart requests.
//! * **Shells** are interactive administrators whose command surface is
//!   provided by plugins.
//!
//! ## Architecture
//!
//! * [`identity`] - persistent UUID -> (name, public key) registry behind
//!   key-pair authentication
//! * [`registry`] - the live session table, at most one session per UUID
//! * [`connection`] - connection classification and per-role session setup
//! * [`sessions`] - the three core-side session kinds
//! * [`plugins`] - the plugin hook surface, including the built-in admin
//!   command surface and restart scheduler
//! * [`server`] - the accept loop tying it all together
//!
//! The core contains no game knowledge beyond the wrapper event vocabulary;
//! policy lives in plugins.

pub use config::{AppConfig, ServerConfig};
pub use error::{PluginError, ServerError};
pub use plane::ControlPlane;
pub use server::WardenServer;

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod plane;
pub mod plugins;
pub mod registry;
pub mod server;
pub mod sessions;
pub mod shutdown;

mod connection;
