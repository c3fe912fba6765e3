//! The core-side session of an interactive administrator.
//!
//! Shells authenticate by account name against the configured admin table
//! and are not registered in the UUID session registry. Their command
//! surface is populated entirely by plugins through the shell init hook.
//!
//! Each shell owns a listener token. Listeners the shell registers on other
//! sessions (for example `Server-Listen` log forwarding) are owned by that
//! token and invalidated as a batch when the shell session closes.

use std::sync::Arc;

use warden_protocol::{ListenerToken, Protocol};

/// A live shell session on the core.
pub struct ShellSession {
    protocol: Arc<Protocol>,
    user: String,
    token: ListenerToken,
}

impl ShellSession {
    pub fn new(protocol: Arc<Protocol>, user: impl Into<String>) -> Arc<Self> {
        let session = Arc::new(Self {
            protocol,
            user: user.into(),
            token: ListenerToken::new(),
        });
        let token = session.token.clone();
        session.protocol.add_close_hook(move || token.revoke());
        session
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// The ownership token for listeners registered on behalf of this shell.
    pub fn token(&self) -> &ListenerToken {
        &self.token
    }
}
