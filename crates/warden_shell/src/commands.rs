//! The shell's local command table.
//!
//! Each interactive line maps to a protocol command sent to the core.
//! Replies come back under well-known command names and are printed by the
//! handlers registered in [`register_reply_handlers`]; plain text replies
//! arrive under `Message`.

use std::sync::Arc;

use clap::{Arg, Command};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use warden_protocol::Protocol;

/// Executes one interactive command line against the core session.
pub fn execute(protocol: &Arc<Protocol>, line: &str) {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return;
    };
    let args: Vec<String> = parts.map(str::to_string).collect();
    match command {
        "servers-list" => protocol.send("Servers-List", json!({})),
        "kickstarters-list" => protocol.send("Kickstarters-List", json!({})),
        "server-keys-list" => protocol.send("Server-Keys-List", json!({})),
        "server-keys-add" => {
            for name in &args {
                protocol.send("Server-Keys-Add", json!({ "name": name }));
            }
        }
        "server-keys-remove" => {
            for uuid in parse_uuids(&args) {
                protocol.send("Server-Keys-Remove", json!({ "uuid": uuid }));
            }
        }
        "server-listen" => {
            for uuid in parse_uuids(&args) {
                protocol.send("Server-Listen", json!({ "uuid": uuid }));
            }
        }
        "kickstarter-servers-list"
        | "kickstarter-servers-start"
        | "kickstarter-servers-stop"
        | "kickstarter-servers-restart" => kickstarter_command(protocol, command, &args),
        _ => warn!("Unknown command: {command}"),
    }
}

fn parse_uuids(args: &[String]) -> Vec<Uuid> {
    let mut uuids = Vec::new();
    for arg in args {
        match Uuid::parse_str(arg) {
            Ok(uuid) => uuids.push(uuid),
            Err(e) => warn!("Invalid UUID given: {e}"),
        }
    }
    uuids
}

fn kickstarter_command(protocol: &Arc<Protocol>, command: &str, args: &[String]) {
    let parsed = Command::new(command.to_string())
        .no_binary_name(true)
        .arg(
            Arg::new("kickstarter")
                .short('k')
                .long("kickstarter")
                .value_name("UUID")
                .help("Kickstarter UUID"),
        )
        .arg(Arg::new("names").num_args(0..))
        .try_get_matches_from(args);
    let matches = match parsed {
        Ok(matches) => matches,
        Err(e) => {
            warn!("Failed to parse command: {e}");
            return;
        }
    };
    let Some(uuid_text) = matches.get_one::<String>("kickstarter") else {
        warn!("No Kickstarter UUID given");
        return;
    };
    let uuid = match Uuid::parse_str(uuid_text) {
        Ok(uuid) => uuid,
        Err(e) => {
            warn!("Invalid Kickstarter UUID given: {e}");
            return;
        }
    };

    if command == "kickstarter-servers-list" {
        protocol.send("Kickstarter-Servers-List", json!({ "kickstarter": uuid }));
        return;
    }
    let wire_command = match command {
        "kickstarter-servers-start" => "Kickstarter-Servers-Start",
        "kickstarter-servers-stop" => "Kickstarter-Servers-Stop",
        _ => "Kickstarter-Servers-Restart",
    };
    for name in matches.get_many::<String>("names").into_iter().flatten() {
        protocol.send(
            wire_command,
            json!({ "kickstarter": uuid, "name": name }),
        );
    }
}

/// Registers the handlers that print core replies.
pub fn register_reply_handlers(protocol: &Arc<Protocol>) {
    protocol.add_command("Message", |_, payload| {
        if let Some(message) = payload.get("message").and_then(Value::as_str) {
            println!("{message}");
        }
        Ok(())
    });
    protocol.add_command("Kickstarter-Servers-List", |_, payload| {
        let mut output = String::with_capacity(1024);
        if let Some(servers) = payload.get("servers").and_then(Value::as_array) {
            for name in servers
                .iter()
                .filter_map(|server| server.get("name").and_then(Value::as_str))
            {
                output.push_str(name);
                output.push('\n');
            }
        }
        println!("{output}");
        Ok(())
    });
    protocol.add_command("Server-Keys-Add", |_, payload| {
        if payload.get("success").and_then(Value::as_bool) == Some(true) {
            info!("Added key successfully");
            if let Some(uuid) = payload.get("uuid").and_then(Value::as_str) {
                info!("UUID: {uuid}");
            }
            if let Some(private_key) = payload.get("private_key").and_then(Value::as_str) {
                info!("Private Key: {private_key}");
            }
        } else {
            warn!("Failed to add key");
            if let Some(error) = payload.get("error").and_then(Value::as_str) {
                warn!("{error}");
            }
        }
        Ok(())
    });
    protocol.add_command("Server-Keys-Remove", |_, payload| {
        if payload.get("success").and_then(Value::as_bool) == Some(true) {
            info!("Removed key successfully");
        } else {
            warn!("Failed to remove key");
            if let Some(error) = payload.get("error").and_then(Value::as_str) {
                warn!("{error}");
            }
        }
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;
    use warden_protocol::{Message, Transport};

    async fn sent_commands(lines: &[&str]) -> Vec<Message> {
        let (near, far) = Transport::pair();
        let protocol = Protocol::new("admin", Arc::new(near));
        for line in lines {
            execute(&protocol, line);
        }
        let mut messages = Vec::new();
        loop {
            match timeout(Duration::from_millis(100), far.recv()).await {
                Ok(Some(frame)) => messages.push(Message::decode(&frame).unwrap()),
                _ => break,
            }
        }
        messages
    }

    #[tokio::test]
    async fn listing_commands_map_to_their_wire_names() {
        let sent = sent_commands(&["servers-list", "kickstarters-list", "server-keys-list"]).await;
        let names: Vec<&str> = sent.iter().map(|m| m.command.as_str()).collect();
        assert_eq!(
            names,
            vec!["Servers-List", "Kickstarters-List", "Server-Keys-List"]
        );
    }

    #[tokio::test]
    async fn key_add_sends_one_request_per_name() {
        let sent = sent_commands(&["server-keys-add survival creative"]).await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].payload["name"], "survival");
        assert_eq!(sent[1].payload["name"], "creative");
    }

    #[tokio::test]
    async fn invalid_uuids_are_dropped_locally() {
        let sent = sent_commands(&["server-keys-remove not-a-uuid"]).await;
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn kickstarter_commands_carry_the_uuid_option() {
        let uuid = Uuid::new_v4();
        let sent = sent_commands(&[
            &format!("kickstarter-servers-start -k {uuid} survival creative"),
            &format!("kickstarter-servers-list -k {uuid}"),
        ])
        .await;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].command, "Kickstarter-Servers-Start");
        assert_eq!(sent[0].payload["kickstarter"], uuid.to_string());
        assert_eq!(sent[0].payload["name"], "survival");
        assert_eq!(sent[1].payload["name"], "creative");
        assert_eq!(sent[2].command, "Kickstarter-Servers-List");
    }

    #[tokio::test]
    async fn missing_kickstarter_uuid_sends_nothing() {
        let sent = sent_commands(&["kickstarter-servers-start survival"]).await;
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn unknown_local_commands_send_nothing() {
        let sent = sent_commands(&["frobnicate everything"]).await;
        assert!(sent.is_empty());
    }
}
