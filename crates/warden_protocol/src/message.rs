//! Wire message framing and connection classification bytes.
//!
//! Every client connection starts with the fixed [`CONNECTION_MAGIC`] bytes
//! followed by a single [`Role`] selector byte; everything after that is a
//! stream of length-delimited [`Message`] frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// The 6-byte magic value written at the start of every connection.
pub const CONNECTION_MAGIC: [u8; 6] = *b"Warden";

/// The role a connecting agent claims with its selector byte.
///
/// The byte values are part of the wire protocol and stable:
/// `1` = wrapper, `2` = shell, `3` = kickstarter. Any other value causes the
/// connection to be rejected before a session exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Embedded in a running game-server process; reports logs, chat and
    /// roster changes and accepts remote commands.
    Wrapper,
    /// An interactive administrator.
    Shell,
    /// A host-side supervisor that starts, stops and restarts game-server
    /// instances.
    Kickstarter,
}

impl Role {
    /// Decodes a role selector byte, returning `None` for unknown values.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Role::Wrapper),
            2 => Some(Role::Shell),
            3 => Some(Role::Kickstarter),
            _ => None,
        }
    }

    /// The selector byte written on the wire for this role.
    pub fn as_byte(self) -> u8 {
        match self {
            Role::Wrapper => 1,
            Role::Shell => 2,
            Role::Kickstarter => 3,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Wrapper => "wrapper",
            Role::Shell => "shell",
            Role::Kickstarter => "kickstarter",
        };
        f.write_str(name)
    }
}

/// A single named-command frame.
///
/// Command names are case-sensitive and matched exactly against the
/// per-session command table. The payload is an arbitrary JSON object whose
/// shape is a contract between the sender and the registered handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The command name this frame is dispatched under.
    pub command: String,
    /// Free-form payload, `null` when the command carries no data.
    #[serde(default)]
    pub payload: Value,
}

impl Message {
    /// Creates a message with the given command name and payload.
    pub fn new(command: impl Into<String>, payload: Value) -> Self {
        Self {
            command: command.into(),
            payload,
        }
    }

    /// Serializes the message into a wire frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a wire frame back into a message.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(frame)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_bytes_round_trip() {
        for role in [Role::Wrapper, Role::Shell, Role::Kickstarter] {
            assert_eq!(Role::from_byte(role.as_byte()), Some(role));
        }
        assert_eq!(Role::from_byte(0), None);
        assert_eq!(Role::from_byte(4), None);
        assert_eq!(Role::from_byte(255), None);
    }

    #[test]
    fn message_encode_decode() {
        let msg = Message::new("Players-List", json!({ "players": [{ "name": "Alice" }] }));
        let frame = msg.encode().unwrap();
        let back = Message::decode(&frame).unwrap();
        assert_eq!(back.command, "Players-List");
        assert_eq!(back.payload["players"][0]["name"], "Alice");
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let back = Message::decode(br#"{"command":"List"}"#).unwrap();
        assert_eq!(back.command, "List");
        assert!(back.payload.is_null());
    }

    #[test]
    fn magic_is_six_bytes() {
        assert_eq!(CONNECTION_MAGIC.len(), 6);
    }
}
