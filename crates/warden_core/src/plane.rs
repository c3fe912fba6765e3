//! The control-plane state shared across the core.
//!
//! `ControlPlane` owns the process-scoped registries with an explicit
//! lifecycle: created at host startup, shared by handle into session workers
//! and plugins, torn down at shutdown. Nothing here is an ambient static;
//! everything is reached through this handle.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::identity::IdentityRegistry;
use crate::registry::SessionRegistry;
use crate::sessions::{CoreSession, KickstarterSession, WrapperSession};
use crate::shutdown::CrashHandler;

/// Shared handle to the core's registries and admin table.
pub struct ControlPlane {
    /// Persistent identity table behind key-pair authentication.
    pub identities: Arc<IdentityRegistry>,
    /// Live session table, at most one session per identity.
    pub sessions: Arc<SessionRegistry>,
    admins: HashMap<String, String>,
    crash: CrashHandler,
}

impl ControlPlane {
    pub fn new(
        identities: Arc<IdentityRegistry>,
        sessions: Arc<SessionRegistry>,
        admins: HashMap<String, String>,
        crash: CrashHandler,
    ) -> Arc<Self> {
        Arc::new(Self {
            identities,
            sessions,
            admins,
            crash,
        })
    }

    /// The configured password for an admin account, if any.
    ///
    /// Pure lookup, safe to call concurrently from authentication callbacks.
    pub fn admin_password(&self, user: &str) -> Option<String> {
        self.admins.get(user).cloned()
    }

    /// Registers a session under its identity UUID; last writer wins.
    pub fn register_session(&self, uuid: Uuid, session: CoreSession) {
        self.sessions.register(uuid, session);
    }

    /// Looks up a live wrapper session.
    pub fn wrapper(&self, uuid: &Uuid) -> Option<Arc<WrapperSession>> {
        self.sessions.wrapper(uuid)
    }

    /// Looks up a live kickstarter session.
    pub fn kickstarter(&self, uuid: &Uuid) -> Option<Arc<KickstarterSession>> {
        self.sessions.kickstarter(uuid)
    }

    /// The crash escalation channel for supervised background tasks.
    pub fn crash(&self) -> &CrashHandler {
        &self.crash
    }
}
