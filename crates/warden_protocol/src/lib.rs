//! # Warden Protocol
//!
//! The session protocol shared by the Warden core and every remote agent
//! (wrapper, kickstarter, shell). This crate provides the pieces that both
//! sides of a connection agree on:
//!
//! * **Wire messages** - JSON frames of the form `{ "command": ..., "payload": ... }`
//!   preceded on every fresh connection by a fixed 6-byte magic value and a
//!   one-byte role selector ([`message`]).
//! * **Transport** - a reliable, ordered, length-delimited message channel
//!   over TCP, plus an in-memory pair for tests ([`transport`]).
//! * **Command dispatch** - per-session named-command tables with
//!   fire-and-forget sends and one-shot response hooks ([`protocol`]).
//! * **Event bus** - per-session priority-ordered listener fan-out with
//!   cooperative mute semantics and owner-token revocation ([`events`]).
//! * **Authentication** - the key-pair and salted-password challenge
//!   primitives used during the connection handshake ([`auth`]).
//! * **Directory snapshots** - the confined directory-tree transfer
//!   structure and its filesystem walk ([`snapshot`]).
//!
//! Byte-level TLS wrapping, scheduling and configuration are deliberately
//! not part of this crate; they belong to the binaries that embed it.

pub mod auth;
pub mod error;
pub mod events;
pub mod message;
pub mod protocol;
pub mod snapshot;
pub mod transport;

pub use auth::{
    client_handshake, decode_signing_key, decode_verifying_key, encode_signing_key,
    encode_verifying_key, server_handshake, ClientAuth, KeyDecodeError, ServerAuth,
};
pub use error::ProtocolError;
pub use events::{EventBus, ListenerToken};
pub use message::{Message, Role, CONNECTION_MAGIC};
pub use protocol::Protocol;
pub use snapshot::{snapshot_directory, write_snapshot, DirEntry, SnapshotError};
pub use transport::Transport;
