//! The core-side session of a game-server wrapper.
//!
//! A wrapper announces itself with a one-time `Wrapper-Init` carrying its
//! configuration payload. Only after init does the session join the session
//! registry and gain its reporting command family (`Log`, `Chat`,
//! `Players-Join`, `Players-Leave`). Receiving `Wrapper-Init` twice is a
//! protocol violation that tears the session down; the gate doubles as a
//! guard against premature reporting from a wrapper that skipped the
//! handshake ceremony.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use warden_protocol::{Protocol, ProtocolError};

use crate::events::{ChatEvent, LogEvent, PlayerJoinEvent, PlayerLeaveEvent};
use crate::plane::ControlPlane;
use crate::plugins::PluginHost;
use crate::sessions::CoreSession;

/// One entry of a wrapper's player roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
}

/// A live wrapper session on the core.
pub struct WrapperSession {
    protocol: Arc<Protocol>,
    uuid: Uuid,
    plane: Arc<ControlPlane>,
    plugins: Arc<PluginHost>,
    initialized: AtomicBool,
    players: RwLock<Vec<Player>>,
}

impl WrapperSession {
    /// Wires the session's initial command table onto an authenticated
    /// protocol endpoint. Everything beyond `Wrapper-Init` and
    /// `Players-List` is registered by the init handler itself.
    pub fn new(
        protocol: Arc<Protocol>,
        uuid: Uuid,
        plane: Arc<ControlPlane>,
        plugins: Arc<PluginHost>,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            protocol,
            uuid,
            plane,
            plugins,
            initialized: AtomicBool::new(false),
            players: RwLock::new(Vec::new()),
        });

        {
            let weak = Arc::downgrade(&session);
            session.protocol.add_command("Wrapper-Init", move |proto, payload| {
                let Some(session) = weak.upgrade() else {
                    return Ok(());
                };
                session.handle_init(proto, payload)
            });
        }
        {
            let weak = Arc::downgrade(&session);
            session.protocol.add_command("Players-List", move |_, payload| {
                if let Some(session) = weak.upgrade() {
                    session.replace_players(&payload);
                }
                Ok(())
            });
        }

        session
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// An immutable snapshot of the last reported roster.
    pub fn players(&self) -> Vec<Player> {
        self.players
            .read()
            .map(|players| players.clone())
            .unwrap_or_default()
    }

    /// Asks the wrapped game server to shut down cleanly.
    pub fn stop(&self) {
        self.protocol.send("Command", json!({ "command": "stop" }));
    }

    /// Relays one or more console commands to the wrapped game server.
    pub fn execute(&self, command: impl Into<String>) {
        self.protocol
            .send("Command", json!({ "command": command.into() }));
    }

    fn handle_init(
        self: &Arc<Self>,
        proto: &Arc<Protocol>,
        payload: Value,
    ) -> Result<(), ProtocolError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(ProtocolError::Violation(
                "Wrapper-Init received twice".to_string(),
            ));
        }

        proto.add_command("Log", |proto, payload| {
            if let Some(message) = payload.get("message").and_then(Value::as_str) {
                let mut event = LogEvent::new(message);
                proto.events().fire(&mut event);
            }
            Ok(())
        });
        proto.add_command("Chat", |proto, payload| {
            if let (Some(name), Some(message)) = (
                payload.get("name").and_then(Value::as_str),
                payload.get("message").and_then(Value::as_str),
            ) {
                let mut event = ChatEvent::new(name, message);
                proto.events().fire(&mut event);
            }
            Ok(())
        });
        proto.add_command("Players-Join", |proto, payload| {
            if let Some(name) = payload.get("name").and_then(Value::as_str) {
                let mut event = PlayerJoinEvent::new(name);
                proto.events().fire(&mut event);
            }
            Ok(())
        });
        proto.add_command("Players-Leave", |proto, payload| {
            if let Some(name) = payload.get("name").and_then(Value::as_str) {
                let mut event = PlayerLeaveEvent::new(name);
                proto.events().fire(&mut event);
            }
            Ok(())
        });

        self.plane
            .register_session(self.uuid, CoreSession::Wrapper(self.clone()));
        self.plugins.wrapper_init(self, &payload);
        info!("Wrapper {} completed init", self.uuid);
        Ok(())
    }

    fn replace_players(&self, payload: &Value) {
        let Some(list) = payload.get("players").and_then(Value::as_array) else {
            return;
        };
        // Wholesale replacement, never an incremental diff.
        let roster: Vec<Player> = list
            .iter()
            .filter_map(|entry| entry.get("name").and_then(Value::as_str))
            .map(|name| Player {
                name: name.to_string(),
            })
            .collect();
        if let Ok(mut players) = self.players.write() {
            *players = roster;
        }
    }
}
