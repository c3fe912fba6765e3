//! End-to-end tests for the core: real TCP connections, the full
//! classification and handshake path, and the admin surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use uuid::Uuid;

use warden_core::shutdown::crash_channel;
use warden_core::{ServerConfig, WardenServer};
use warden_protocol::{
    client_handshake, ClientAuth, Message, Protocol, Role, Transport, CONNECTION_MAGIC,
};

struct TestServer {
    server: Arc<WardenServer>,
    addr: SocketAddr,
    _dir: tempfile::TempDir,
}

async fn start_server(admins: &[(&str, &str)]) -> TestServer {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        data_directory: dir.path().join("data"),
        admins: admins
            .iter()
            .map(|(user, password)| (user.to_string(), password.to_string()))
            .collect(),
        plugin_config: json!({}),
    };
    let (crash, _crash_rx) = crash_channel();
    let server = Arc::new(WardenServer::new(config, crash).expect("server should build"));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    {
        let server = server.clone();
        tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });
    }
    TestServer {
        server,
        addr,
        _dir: dir,
    }
}

async fn dial(addr: SocketAddr, role_byte: u8) -> Arc<Transport> {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let mut header = [0u8; 7];
    header[..6].copy_from_slice(&CONNECTION_MAGIC);
    header[6] = role_byte;
    stream.write_all(&header).await.expect("write header");
    Arc::new(Transport::from_tcp(stream))
}

async fn recv_command(transport: &Transport) -> Message {
    let frame = timeout(Duration::from_secs(2), transport.recv())
        .await
        .expect("reply should arrive in time")
        .expect("transport should still be open");
    Message::decode(&frame).expect("reply should decode")
}

fn send_command(transport: &Transport, command: &str, payload: Value) {
    transport
        .send(Message::new(command, payload).encode().unwrap())
        .expect("send");
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition should hold in time");
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_wrapper_init_tears_down_the_session_and_frees_the_slot() {
    let test = start_server(&[]).await;
    let (uuid, signing) = test.server.plane().identities.create("survival").await;

    let transport = dial(test.addr, Role::Wrapper.as_byte()).await;
    client_handshake(
        &transport,
        &uuid.to_string(),
        &ClientAuth::key_pair(signing),
    )
    .await
    .expect("wrapper should authenticate");

    // First init registers the session.
    send_command(&transport, "Wrapper-Init", json!({}));
    let plane = test.server.plane().clone();
    wait_until(|| plane.sessions.contains(&uuid)).await;

    // Second init is a protocol violation: session closes, slot frees.
    send_command(&transport, "Wrapper-Init", json!({}));
    timeout(Duration::from_secs(2), transport.closed())
        .await
        .expect("server should close the session");
    wait_until(|| !plane.sessions.contains(&uuid)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_uuid_registration_closes_the_previous_session() {
    let test = start_server(&[]).await;
    let (uuid, signing) = test.server.plane().identities.create("host-1").await;

    let first = dial(test.addr, Role::Kickstarter.as_byte()).await;
    client_handshake(
        &first,
        &uuid.to_string(),
        &ClientAuth::key_pair(signing.clone()),
    )
    .await
    .expect("first kickstarter should authenticate");
    let plane = test.server.plane().clone();
    wait_until(|| plane.sessions.contains(&uuid)).await;

    let second = dial(test.addr, Role::Kickstarter.as_byte()).await;
    client_handshake(
        &second,
        &uuid.to_string(),
        &ClientAuth::key_pair(signing),
    )
    .await
    .expect("second kickstarter should authenticate");

    // Most recent connection wins; the first transport gets closed.
    timeout(Duration::from_secs(2), first.closed())
        .await
        .expect("previous session should be closed");
    assert!(plane.sessions.contains(&uuid));
    assert!(!second.is_closed());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_role_byte_creates_no_session() {
    let test = start_server(&[]).await;
    let transport = dial(test.addr, 9).await;
    // The server drops the connection without ever answering.
    timeout(Duration::from_secs(2), transport.closed())
        .await
        .expect("connection should be dropped");
    assert!(test.server.plane().sessions.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_magic_creates_no_session() {
    let test = start_server(&[]).await;
    let mut stream = TcpStream::connect(test.addr).await.expect("connect");
    stream.write_all(b"Nope!!\x01").await.expect("write");
    let transport = Arc::new(Transport::from_tcp(stream));
    timeout(Duration::from_secs(2), transport.closed())
        .await
        .expect("connection should be dropped");
    assert!(test.server.plane().sessions.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_identity_is_rejected() {
    let test = start_server(&[]).await;
    let transport = dial(test.addr, Role::Wrapper.as_byte()).await;
    let stray = ed25519_dalek_signing_key();
    let result = client_handshake(
        &transport,
        &Uuid::new_v4().to_string(),
        &ClientAuth::key_pair(stray),
    )
    .await;
    assert!(result.is_err());
    assert!(test.server.plane().sessions.is_empty());
}

fn ed25519_dalek_signing_key() -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng)
}

#[tokio::test(flavor = "multi_thread")]
async fn shell_login_and_key_management_surface() {
    let test = start_server(&[("admin", "hunter2")]).await;
    let transport = dial(test.addr, Role::Shell.as_byte()).await;
    client_handshake(&transport, "admin", &ClientAuth::password("hunter2"))
        .await
        .expect("shell should authenticate");

    // No wrappers yet: the listing reply is an empty message.
    send_command(&transport, "Servers-List", json!({}));
    let reply = recv_command(&transport).await;
    assert_eq!(reply.command, "Message");
    assert_eq!(reply.payload["message"], "");

    // Creating a key returns the private half exactly once.
    send_command(&transport, "Server-Keys-Add", json!({ "name": "creative" }));
    let reply = recv_command(&transport).await;
    assert_eq!(reply.command, "Server-Keys-Add");
    assert_eq!(reply.payload["success"], json!(true));
    let uuid: Uuid = reply.payload["uuid"].as_str().unwrap().parse().unwrap();
    assert!(reply.payload["private_key"].as_str().is_some());
    assert!(test.server.plane().identities.get(&uuid).is_some());

    // Removing it succeeds once, then reports the unknown identity.
    send_command(&transport, "Server-Keys-Remove", json!({ "uuid": uuid.to_string() }));
    let reply = recv_command(&transport).await;
    assert_eq!(reply.payload["success"], json!(true));
    send_command(&transport, "Server-Keys-Remove", json!({ "uuid": uuid.to_string() }));
    let reply = recv_command(&transport).await;
    assert_eq!(reply.payload["success"], json!(false));
    assert!(reply.payload["error"].as_str().is_some());

    // A failed command never closes the shell session.
    assert!(!transport.is_closed());
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_shell_password_is_rejected() {
    let test = start_server(&[("admin", "hunter2")]).await;
    let transport = dial(test.addr, Role::Shell.as_byte()).await;
    let result = client_handshake(&transport, "admin", &ClientAuth::password("guess")).await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn shell_relays_to_kickstarter_and_routes_the_reply_back() {
    let test = start_server(&[("admin", "hunter2")]).await;
    let (uuid, signing) = test.server.plane().identities.create("host-1").await;

    // A kickstarter that answers List with a fixed server set.
    let ks_transport = dial(test.addr, Role::Kickstarter.as_byte()).await;
    client_handshake(
        &ks_transport,
        &uuid.to_string(),
        &ClientAuth::key_pair(signing),
    )
    .await
    .expect("kickstarter should authenticate");
    let ks_protocol = Protocol::new(uuid.to_string(), ks_transport);
    ks_protocol.add_command("List", |proto, _| {
        proto.send("List", json!({ "servers": [{ "name": "survival" }] }));
        Ok(())
    });
    {
        let ks_protocol = ks_protocol.clone();
        tokio::spawn(async move {
            let _ = ks_protocol.run().await;
        });
    }
    let plane = test.server.plane().clone();
    wait_until(|| plane.sessions.contains(&uuid)).await;

    // The shell asks the core, the core relays, the reply routes back.
    let shell = dial(test.addr, Role::Shell.as_byte()).await;
    client_handshake(&shell, "admin", &ClientAuth::password("hunter2"))
        .await
        .expect("shell should authenticate");
    send_command(
        &shell,
        "Kickstarter-Servers-List",
        json!({ "kickstarter": uuid.to_string() }),
    );
    let reply = recv_command(&shell).await;
    assert_eq!(reply.command, "Kickstarter-Servers-List");
    assert_eq!(reply.payload["servers"][0]["name"], "survival");

    // An unknown kickstarter produces a structured error instead.
    send_command(
        &shell,
        "Kickstarter-Servers-List",
        json!({ "kickstarter": Uuid::new_v4().to_string() }),
    );
    let reply = recv_command(&shell).await;
    assert_eq!(reply.payload["success"], json!(false));
}

#[tokio::test(flavor = "multi_thread")]
async fn wrapper_client_state_machine_runs_one_full_session() {
    use warden_client::{run_client, ClientConfig, RoleClient};

    struct InitOnce;

    #[async_trait::async_trait]
    impl RoleClient for InitOnce {
        async fn on_open(&self, session: &Arc<Protocol>) {
            session.send("Wrapper-Init", json!({ "motd": "hi" }));
        }

        async fn on_close(&self) {}
    }

    let test = start_server(&[]).await;
    let (uuid, signing) = test.server.plane().identities.create("survival").await;

    let mut config = ClientConfig::new(
        test.addr.to_string(),
        Role::Wrapper,
        uuid.to_string(),
        ClientAuth::key_pair(signing),
    );
    config.reconnect = false;

    let client = tokio::spawn(run_client(config, Arc::new(InitOnce)));

    let plane = test.server.plane().clone();
    wait_until(|| plane.sessions.contains(&uuid)).await;

    // Close from the core side; the client observes it and returns.
    if let Some(session) = plane.sessions.get(&uuid) {
        session.request_close();
    }
    let result = timeout(Duration::from_secs(5), client)
        .await
        .expect("client should return after close")
        .expect("client task should not panic");
    assert!(result.is_ok());
    wait_until(|| !plane.sessions.contains(&uuid)).await;
}
