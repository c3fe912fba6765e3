//! The core-side session of a kickstarter supervisor.
//!
//! Kickstarters register no inbound commands of their own on the core; they
//! are relay targets. Shell-issued management commands are forwarded to the
//! kickstarter's own command set (`List`, `Start`, `Stop`, `Restart`) and
//! replies routed back through one-shot command hooks.

use std::sync::Arc;

use uuid::Uuid;

use warden_protocol::Protocol;

/// A live kickstarter session on the core.
pub struct KickstarterSession {
    protocol: Arc<Protocol>,
    uuid: Uuid,
}

impl KickstarterSession {
    pub fn new(protocol: Arc<Protocol>, uuid: Uuid) -> Arc<Self> {
        Arc::new(Self { protocol, uuid })
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}
