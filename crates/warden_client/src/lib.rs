//! # Warden Client
//!
//! The client-side connection state machine shared by the wrapper,
//! kickstarter and shell binaries. All three roles run exactly the same
//! cycle:
//!
//! ```text
//! Connecting -> Authenticating -> Open -> Closed
//!      ^                                    |
//!      +----------- reconnect delay --------+
//! ```
//!
//! The roles differ only in the role byte written after the connection
//! magic, the identity they claim, the authentication material, and the
//! commands they register once open. Everything else, including the two
//! reconnect backoffs, is identical.
//!
//! # Backoffs
//!
//! A dial failure usually means the core is down or unreachable, so the next
//! attempt waits the long [`ClientConfig::dial_retry`] (tens of seconds). A
//! disconnect after the session was open usually means a transient hiccup,
//! so the next attempt waits only the short [`ClientConfig::reconnect_delay`]
//! (a few seconds). The long delay is required to be strictly greater than
//! the short one.

pub mod directory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{error, info, warn};

use warden_protocol::{client_handshake, ClientAuth, Protocol, Role, Transport, CONNECTION_MAGIC};

/// Errors from the client state machine.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The dial itself failed and the configuration forbids retrying.
    #[error("failed to connect: {0}")]
    Dial(#[from] std::io::Error),

    /// The configured backoffs are inconsistent.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

/// Configuration for one client role instance.
#[derive(Clone)]
pub struct ClientConfig {
    /// Core address in `host:port` form.
    pub address: String,
    /// The role byte written right after the connection magic.
    pub role: Role,
    /// The identity claimed during authentication: a UUID string for
    /// wrappers and kickstarters, an account name for shells.
    pub identity: String,
    /// Authentication material matching the claimed identity.
    pub auth: ClientAuth,
    /// Backoff after a failed dial.
    pub dial_retry: Duration,
    /// Backoff after losing an established session.
    pub reconnect_delay: Duration,
    /// Whether to rearm the reconnect timer at all. The shell runs one
    /// session and exits; wrappers and kickstarters reconnect forever.
    pub reconnect: bool,
}

impl ClientConfig {
    /// Creates a configuration with the standard backoffs: 20 seconds after
    /// a dial failure, 5 seconds after losing an open session.
    pub fn new(address: impl Into<String>, role: Role, identity: impl Into<String>, auth: ClientAuth) -> Self {
        Self {
            address: address.into(),
            role,
            identity: identity.into(),
            auth,
            dial_retry: Duration::from_secs(20),
            reconnect_delay: Duration::from_secs(5),
            reconnect: true,
        }
    }

    /// Checks the backoff invariant: dial failures must wait strictly
    /// longer than post-open disconnects.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.dial_retry <= self.reconnect_delay {
            return Err(ClientError::Config(
                "dial_retry must exceed reconnect_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Role-specific behavior plugged into the shared state machine.
#[async_trait]
pub trait RoleClient: Send + Sync {
    /// Runs once per session, right after authentication succeeds. This is
    /// where the role registers its command set and sends any init payload.
    async fn on_open(&self, session: &Arc<Protocol>);

    /// Runs once per session after it closed, before the reconnect timer is
    /// armed.
    async fn on_close(&self);
}

/// Drives the connect/authenticate/operate/close/reconnect loop.
///
/// Returns only when `config.reconnect` is false: `Ok(())` after the single
/// session closed, or `Err` when the single dial failed. With reconnection
/// enabled this future runs until the process shuts down.
pub async fn run_client(config: ClientConfig, role: Arc<dyn RoleClient>) -> Result<(), ClientError> {
    config.validate()?;
    loop {
        info!("Connecting to {}...", config.address);
        let stream = match TcpStream::connect(&config.address).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to connect: {e}");
                if !config.reconnect {
                    return Err(ClientError::Dial(e));
                }
                tokio::time::sleep(config.dial_retry).await;
                continue;
            }
        };

        match run_session(&config, stream, &role).await {
            Ok(()) => info!("Disconnected!"),
            Err(e) => warn!("Session ended: {e}"),
        }
        role.on_close().await;

        if !config.reconnect {
            return Ok(());
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

async fn run_session(
    config: &ClientConfig,
    mut stream: TcpStream,
    role: &Arc<dyn RoleClient>,
) -> Result<(), warden_protocol::ProtocolError> {
    // The magic and role byte go out raw, before the framed protocol starts.
    let mut header = [0u8; 7];
    header[..6].copy_from_slice(&CONNECTION_MAGIC);
    header[6] = config.role.as_byte();
    stream.write_all(&header).await?;
    stream.flush().await?;

    let transport = Arc::new(Transport::from_tcp(stream));
    client_handshake(&transport, &config.identity, &config.auth).await?;
    info!("Connected!");

    let session = Protocol::new(config.identity.clone(), transport);
    role.on_open(&session).await;
    session.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn test_config() -> ClientConfig {
        let key = SigningKey::generate(&mut OsRng);
        ClientConfig::new(
            "127.0.0.1:26555",
            Role::Wrapper,
            "00000000-0000-0000-0000-000000000000",
            ClientAuth::key_pair(key),
        )
    }

    #[test]
    fn default_backoffs_match_the_protocol_constants() {
        let config = test_config();
        assert_eq!(config.dial_retry, Duration::from_secs(20));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn dial_failure_waits_strictly_longer_than_reconnect() {
        let config = test_config();
        assert!(config.validate().is_ok());
        assert!(config.dial_retry > config.reconnect_delay);
    }

    #[test]
    fn inverted_backoffs_are_rejected() {
        let mut config = test_config();
        config.dial_retry = Duration::from_secs(1);
        config.reconnect_delay = Duration::from_secs(5);
        assert!(config.validate().is_err());

        // Equal delays lose the distinction as well.
        config.dial_retry = Duration::from_secs(5);
        assert!(config.validate().is_err());
    }
}
