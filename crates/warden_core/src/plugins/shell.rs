//! The admin command surface, exposed to shell sessions as a plugin.
//!
//! Commands that fail reply `{ "success": false, "error": ... }` under the
//! originating command name; they never close the shell session. Relayed
//! kickstarter requests use one-shot command hooks for their replies, so at
//! most one such request is outstanding per command name per session.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use warden_protocol::{encode_signing_key, ListenerToken, Protocol};

use crate::error::PluginError;
use crate::events::LogEvent;
use crate::plane::ControlPlane;
use crate::plugins::{Plugin, PluginProvider};
use crate::sessions::{send_message, ShellSession};

/// Provider for the built-in admin surface.
pub struct ShellPluginProvider;

impl PluginProvider for ShellPluginProvider {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn create(
        &self,
        plane: Arc<ControlPlane>,
        _token: ListenerToken,
        _config: &Value,
    ) -> Result<Option<Box<dyn Plugin>>, PluginError> {
        Ok(Some(Box::new(ShellPlugin { plane })))
    }
}

struct ShellPlugin {
    plane: Arc<ControlPlane>,
}

impl Plugin for ShellPlugin {
    fn on_shell_init(&self, shell: &Arc<ShellSession>) {
        let protocol = shell.protocol();

        {
            let plane = self.plane.clone();
            protocol.add_command("Servers-List", move |proto, _| {
                let mut output = String::with_capacity(1024);
                for (uuid, _wrapper) in plane.sessions.wrappers() {
                    output.push_str(&format!("{uuid}: {}\n", display_name(&plane, &uuid)));
                }
                send_message(proto, output);
                Ok(())
            });
        }
        {
            let plane = self.plane.clone();
            protocol.add_command("Kickstarters-List", move |proto, _| {
                let mut output = String::with_capacity(1024);
                for (uuid, _kickstarter) in plane.sessions.kickstarters() {
                    output.push_str(&format!("{uuid}: {}\n", display_name(&plane, &uuid)));
                }
                send_message(proto, output);
                Ok(())
            });
        }
        {
            let plane = self.plane.clone();
            protocol.add_command("Server-Keys-Add", move |proto, payload| {
                let Some(name) = payload.get("name").and_then(Value::as_str) else {
                    reply_error(proto, "Server-Keys-Add", "missing name");
                    return Ok(());
                };
                // Key generation and the snapshot rewrite run off the
                // session's message path.
                let plane = plane.clone();
                let proto = proto.clone();
                let name = name.to_string();
                tokio::spawn(async move {
                    let (uuid, signing) = plane.identities.create(name).await;
                    proto.send(
                        "Server-Keys-Add",
                        json!({
                            "success": true,
                            "uuid": uuid.to_string(),
                            "private_key": encode_signing_key(&signing),
                        }),
                    );
                });
                Ok(())
            });
        }
        {
            let plane = self.plane.clone();
            protocol.add_command("Server-Keys-Remove", move |proto, payload| {
                let Some(uuid) = parse_uuid(&payload, "uuid") else {
                    reply_error(proto, "Server-Keys-Remove", "missing or invalid uuid");
                    return Ok(());
                };
                let plane = plane.clone();
                let proto = proto.clone();
                tokio::spawn(async move {
                    if plane.identities.remove(uuid).await {
                        proto.send("Server-Keys-Remove", json!({ "success": true }));
                    } else {
                        proto.send(
                            "Server-Keys-Remove",
                            json!({
                                "success": false,
                                "error": format!("Unknown identity: {uuid}"),
                            }),
                        );
                    }
                });
                Ok(())
            });
        }
        {
            let plane = self.plane.clone();
            protocol.add_command("Server-Keys-List", move |proto, _| {
                let mut output = String::with_capacity(1024);
                for identity in plane.identities.list() {
                    output.push_str(&format!("{}: {}\n", identity.id, identity.name));
                }
                send_message(proto, output);
                Ok(())
            });
        }
        {
            let plane = self.plane.clone();
            protocol.add_command("Kickstarter-Servers-List", move |proto, payload| {
                let Some(kickstarter) = lookup_kickstarter(&plane, proto, &payload, "Kickstarter-Servers-List") else {
                    return Ok(());
                };
                let shell_proto = proto.clone();
                kickstarter.protocol().command_hook("List", move |_, reply| {
                    shell_proto.send("Kickstarter-Servers-List", reply);
                    Ok(())
                });
                kickstarter.protocol().send("List", json!({}));
                Ok(())
            });
        }
        for (shell_command, relayed) in [
            ("Kickstarter-Servers-Start", "Start"),
            ("Kickstarter-Servers-Stop", "Stop"),
            ("Kickstarter-Servers-Restart", "Restart"),
        ] {
            let plane = self.plane.clone();
            protocol.add_command(shell_command, move |proto, payload| {
                let Some(kickstarter) = lookup_kickstarter(&plane, proto, &payload, shell_command)
                else {
                    return Ok(());
                };
                kickstarter.protocol().send(relayed, payload);
                Ok(())
            });
        }
        {
            let plane = self.plane.clone();
            let token = shell.token().clone();
            protocol.add_command("Server-Listen", move |proto, payload| {
                let Some(uuid) = parse_uuid(&payload, "uuid") else {
                    reply_error(proto, "Server-Listen", "missing or invalid uuid");
                    return Ok(());
                };
                let Some(wrapper) = plane.wrapper(&uuid) else {
                    reply_error(proto, "Server-Listen", &format!("Unknown server: {uuid}"));
                    return Ok(());
                };
                // The listener is owned by the shell's token; it goes stale
                // when the shell session closes.
                let shell_proto = proto.clone();
                wrapper
                    .protocol()
                    .events()
                    .listen::<LogEvent, _>(&token, 0, move |event| {
                        if event.muted {
                            return;
                        }
                        send_message(&shell_proto, event.message.clone());
                    });
                Ok(())
            });
        }
    }
}

fn display_name(plane: &ControlPlane, uuid: &Uuid) -> String {
    plane
        .identities
        .get(uuid)
        .map(|identity| identity.name)
        .unwrap_or_else(|| "unknown".to_string())
}

fn parse_uuid(payload: &Value, field: &str) -> Option<Uuid> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .and_then(|text| Uuid::parse_str(text).ok())
}

fn lookup_kickstarter(
    plane: &ControlPlane,
    proto: &Arc<Protocol>,
    payload: &Value,
    command: &str,
) -> Option<Arc<crate::sessions::KickstarterSession>> {
    let Some(uuid) = parse_uuid(payload, "kickstarter") else {
        reply_error(proto, command, "missing or invalid kickstarter uuid");
        return None;
    };
    let Some(kickstarter) = plane.kickstarter(&uuid) else {
        reply_error(proto, command, &format!("Unknown kickstarter: {uuid}"));
        return None;
    };
    Some(kickstarter)
}

fn reply_error(proto: &Protocol, command: &str, error: &str) {
    warn!("Shell command {command} failed: {error}");
    proto.send(command, json!({ "success": false, "error": error }));
}
