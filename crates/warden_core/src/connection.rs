//! Connection classification and per-role session setup.
//!
//! Every accepted transport starts with a fixed 6-byte magic value and one
//! role selector byte, read raw off the stream before framing begins. An
//! unknown magic or selector drops the connection with no session created.
//! After classification the shared handshake runs with the role-appropriate
//! authentication strategy, and only then is the session constructed and its
//! pump started.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::info;
use uuid::Uuid;

use warden_protocol::{
    server_handshake, Protocol, ProtocolError, Role, ServerAuth, Transport, CONNECTION_MAGIC,
};

use crate::plane::ControlPlane;
use crate::plugins::PluginHost;
use crate::sessions::{CoreSession, KickstarterSession, ShellSession, WrapperSession};

/// Handles one accepted connection from classification to session end.
///
/// Errors are fatal to this connection only; the caller logs them and moves
/// on.
pub(crate) async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    plane: Arc<ControlPlane>,
    plugins: Arc<PluginHost>,
) -> Result<(), ProtocolError> {
    let mut header = [0u8; 7];
    stream.read_exact(&mut header).await?;
    if header[..6] != CONNECTION_MAGIC {
        return Err(ProtocolError::Violation(format!(
            "bad connection magic from {addr}"
        )));
    }
    let Some(role) = Role::from_byte(header[6]) else {
        return Err(ProtocolError::Violation(format!(
            "unknown role selector {} from {addr}",
            header[6]
        )));
    };

    let transport = Arc::new(Transport::from_tcp(stream));
    match role {
        Role::Wrapper => run_wrapper_session(transport, addr, plane, plugins).await,
        Role::Kickstarter => run_kickstarter_session(transport, addr, plane).await,
        Role::Shell => run_shell_session(transport, addr, plane, plugins).await,
    }
}

/// Resolves a claimed instance identity to key-pair challenge material.
///
/// Pure lookup against the identity registry; an unknown or malformed
/// identity yields nothing and the handshake rejects the connection.
fn key_pair_resolver(plane: Arc<ControlPlane>) -> impl FnOnce(&str) -> Option<ServerAuth> {
    move |claimed| {
        Uuid::parse_str(claimed)
            .ok()
            .and_then(|uuid| plane.identities.get(&uuid))
            .map(|identity| ServerAuth::key_pair(identity.key))
    }
}

async fn run_wrapper_session(
    transport: Arc<Transport>,
    addr: SocketAddr,
    plane: Arc<ControlPlane>,
    plugins: Arc<PluginHost>,
) -> Result<(), ProtocolError> {
    let id = server_handshake(&transport, key_pair_resolver(plane.clone())).await?;
    let uuid = Uuid::parse_str(&id)
        .map_err(|e| ProtocolError::Violation(format!("malformed identity: {e}")))?;

    let protocol = Protocol::new(id, transport);
    // Kept alive for the whole pump; the registry only holds it after init.
    let _session = WrapperSession::new(protocol.clone(), uuid, plane, plugins);
    info!("Wrapper {uuid} authenticated from {addr}");
    protocol.run().await
}

async fn run_kickstarter_session(
    transport: Arc<Transport>,
    addr: SocketAddr,
    plane: Arc<ControlPlane>,
) -> Result<(), ProtocolError> {
    let id = server_handshake(&transport, key_pair_resolver(plane.clone())).await?;
    let uuid = Uuid::parse_str(&id)
        .map_err(|e| ProtocolError::Violation(format!("malformed identity: {e}")))?;

    let protocol = Protocol::new(id, transport);
    let session = KickstarterSession::new(protocol.clone(), uuid);
    plane.register_session(uuid, CoreSession::Kickstarter(session));
    info!("Kickstarter {uuid} authenticated from {addr}");
    protocol.run().await
}

async fn run_shell_session(
    transport: Arc<Transport>,
    addr: SocketAddr,
    plane: Arc<ControlPlane>,
    plugins: Arc<PluginHost>,
) -> Result<(), ProtocolError> {
    let resolver_plane = plane.clone();
    let user = server_handshake(&transport, move |claimed| {
        resolver_plane.admin_password(claimed).map(ServerAuth::password)
    })
    .await?;

    let protocol = Protocol::new(user.clone(), transport);
    let session = ShellSession::new(protocol.clone(), user.clone());
    plugins.shell_init(&session);
    info!("Shell session opened for {user} from {addr}");
    protocol.run().await
}
