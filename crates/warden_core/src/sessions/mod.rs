//! Core-side session kinds.
//!
//! A session is one authenticated, live logical connection of a given role.
//! The role is fixed once at construction by the connection classifier; the
//! set of kinds is closed: wrapper, kickstarter, shell. Wrapper and
//! kickstarter sessions are keyed by identity UUID in the session registry;
//! shell sessions authenticate by account name and are never registered
//! there.

mod kickstarter;
mod shell;
mod wrapper;

pub use kickstarter::KickstarterSession;
pub use shell::ShellSession;
pub use wrapper::{Player, WrapperSession};

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use warden_protocol::Protocol;

/// A registry-keyed session: one of the two UUID-authenticated kinds.
///
/// Deliberately a closed tagged union rather than an open trait; the role
/// set is part of the wire protocol and does not grow at runtime.
#[derive(Clone)]
pub enum CoreSession {
    Wrapper(Arc<WrapperSession>),
    Kickstarter(Arc<KickstarterSession>),
}

impl CoreSession {
    /// The protocol endpoint behind this session.
    pub fn protocol(&self) -> &Arc<Protocol> {
        match self {
            CoreSession::Wrapper(session) => session.protocol(),
            CoreSession::Kickstarter(session) => session.protocol(),
        }
    }

    /// The identity UUID this session authenticated as.
    pub fn uuid(&self) -> Uuid {
        match self {
            CoreSession::Wrapper(session) => session.uuid(),
            CoreSession::Kickstarter(session) => session.uuid(),
        }
    }

    /// Requests a graceful close of the session.
    pub fn request_close(&self) {
        self.protocol().request_close();
    }

    /// Whether two values refer to the same live session instance.
    pub fn same_instance(&self, other: &CoreSession) -> bool {
        Arc::ptr_eq(self.protocol(), other.protocol())
    }

    pub fn as_wrapper(&self) -> Option<Arc<WrapperSession>> {
        match self {
            CoreSession::Wrapper(session) => Some(session.clone()),
            CoreSession::Kickstarter(_) => None,
        }
    }

    pub fn as_kickstarter(&self) -> Option<Arc<KickstarterSession>> {
        match self {
            CoreSession::Kickstarter(session) => Some(session.clone()),
            CoreSession::Wrapper(_) => None,
        }
    }
}

/// Sends a plain text line to the remote end under the `Message` command.
///
/// The shell client prints these verbatim; it is the reply channel for the
/// human-facing admin commands.
pub fn send_message(protocol: &Protocol, text: impl Into<String>) {
    protocol.send("Message", json!({ "message": text.into() }));
}
