//! Semantic events raised inside wrapper sessions.
//!
//! These are fired on the owning session's event bus and fan out to
//! prioritized listeners (plugins, listening shells). Every event carries a
//! `muted` flag: a listener may set it to signal that later listeners should
//! skip processing, and every listener is expected to check it. Dispatch
//! never stops on its own.

/// A raw console line reported by a wrapper.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub message: String,
    pub muted: bool,
}

impl LogEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            muted: false,
        }
    }
}

/// A chat line spoken by a player on a wrapped game server.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub name: String,
    pub message: String,
    pub muted: bool,
}

impl ChatEvent {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            muted: false,
        }
    }
}

/// A player joined the wrapped game server.
#[derive(Debug, Clone)]
pub struct PlayerJoinEvent {
    pub name: String,
    pub muted: bool,
}

impl PlayerJoinEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            muted: false,
        }
    }
}

/// A player left the wrapped game server.
#[derive(Debug, Clone)]
pub struct PlayerLeaveEvent {
    pub name: String,
    pub muted: bool,
}

impl PlayerLeaveEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            muted: false,
        }
    }
}
