//! The session registry: at most one live session per identity.
//!
//! Registering a session under a UUID that already holds one requests a
//! graceful close of the previous session before the new one becomes
//! reachable through lookups; the registry never exposes two sessions for
//! one UUID. Replacement does not wait for the old session's close to
//! finish, favoring availability over strict exclusivity.
//!
//! Each registration installs a close hook that removes the entry only if
//! it still points at that same session instance, so a close racing a
//! replacement can never evict the newer session.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::sessions::{CoreSession, KickstarterSession, WrapperSession};

/// Concurrent UUID -> session table shared by all connection workers.
pub struct SessionRegistry {
    sessions: DashMap<Uuid, CoreSession>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
        })
    }

    /// Installs a session under its identity UUID.
    ///
    /// Last writer wins: a previous holder gets a graceful close request.
    pub fn register(self: &Arc<Self>, uuid: Uuid, session: CoreSession) {
        if let Some(previous) = self.sessions.insert(uuid, session.clone()) {
            debug!("Replacing live session for {uuid}");
            previous.request_close();
        }
        let registry = Arc::downgrade(self);
        let guard = session.clone();
        session.protocol().add_close_hook(move || {
            if let Some(registry) = registry.upgrade() {
                registry
                    .sessions
                    .remove_if(&uuid, |_, current| current.same_instance(&guard));
            }
        });
    }

    /// Looks up the live session under a UUID, any role.
    pub fn get(&self, uuid: &Uuid) -> Option<CoreSession> {
        self.sessions.get(uuid).map(|entry| entry.value().clone())
    }

    /// Looks up a UUID expecting a wrapper session.
    pub fn wrapper(&self, uuid: &Uuid) -> Option<Arc<WrapperSession>> {
        self.get(uuid)?.as_wrapper()
    }

    /// Looks up a UUID expecting a kickstarter session.
    pub fn kickstarter(&self, uuid: &Uuid) -> Option<Arc<KickstarterSession>> {
        self.get(uuid)?.as_kickstarter()
    }

    /// All live wrapper sessions.
    pub fn wrappers(&self) -> Vec<(Uuid, Arc<WrapperSession>)> {
        self.sessions
            .iter()
            .filter_map(|entry| Some((*entry.key(), entry.value().as_wrapper()?)))
            .collect()
    }

    /// All live kickstarter sessions.
    pub fn kickstarters(&self) -> Vec<(Uuid, Arc<KickstarterSession>)> {
        self.sessions
            .iter()
            .filter_map(|entry| Some((*entry.key(), entry.value().as_kickstarter()?)))
            .collect()
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.sessions.contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
