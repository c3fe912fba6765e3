//! Error types for the session protocol.

/// Errors raised by the protocol layer.
///
/// A `Violation` or `Codec` error is fatal to the single session that raised
/// it and never to the process hosting it; the session is torn down and its
/// registry slot freed. `AuthRejected` carries deliberately no detail beyond
/// the rejection itself.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The underlying transport is closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The remote end broke a protocol rule (duplicate init, malformed
    /// handshake frame, oversized frame).
    #[error("protocol violation: {0}")]
    Violation(String),

    /// Authentication failed. Intentionally uninformative.
    #[error("authentication rejected")]
    AuthRejected,

    /// A frame could not be encoded or decoded as a JSON message.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// An I/O error on the underlying channel.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
