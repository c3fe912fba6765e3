//! The bridge between the game server console and the core session.
//!
//! Outbound: console lines are run through the line matcher and become
//! semantic commands (`Log`, `Chat`, `Players-Join`, `Players-Leave`,
//! `Players-List`) on whatever session is currently attached. Inbound: core
//! commands are turned into console input for the game server. The bridge
//! outlives any single session; the reconnect state machine attaches and
//! detaches sessions as they come and go.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use warden_client::directory::register_directory_access;
use warden_client::RoleClient;
use warden_protocol::Protocol;

use crate::logparse::LineMatcher;

// Player names in console lines, with optional color codes around them.
// Group 2 is the bare name.
const PLAYER_NAME: &str = "([\\w\\[\\]\\- ]|§[0-9a-fr])*?(\\w+)(§[0-9a-fr])*?";

/// Holds the currently attached core session, if any.
///
/// Console rules send through this so they keep working across reconnects;
/// between sessions, sends are dropped.
pub struct CoreLink {
    session: RwLock<Option<Arc<Protocol>>>,
}

impl CoreLink {
    pub fn new() -> Self {
        Self {
            session: RwLock::new(None),
        }
    }

    pub fn attach(&self, session: Arc<Protocol>) {
        if let Ok(mut slot) = self.session.write() {
            *slot = Some(session);
        }
    }

    pub fn detach(&self) {
        if let Ok(mut slot) = self.session.write() {
            *slot = None;
        }
    }

    /// Sends a command on the attached session; returns whether one was
    /// attached.
    pub fn send(&self, command: &str, payload: Value) -> bool {
        let Ok(slot) = self.session.read() else {
            return false;
        };
        match slot.as_ref() {
            Some(session) => {
                session.send(command, payload);
                true
            }
            None => false,
        }
    }
}

impl Default for CoreLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the console rules that turn raw output into semantic commands.
pub fn install_rules(
    matcher: &mut LineMatcher,
    link: Arc<CoreLink>,
    console: UnboundedSender<String>,
) -> Result<(), regex::Error> {
    {
        let link = link.clone();
        matcher.add_rule(&[".*"], move |matches| {
            link.send("Log", json!({ "message": matches[0].line() }));
        })?;
    }
    {
        let link = link.clone();
        let chat = format!("{PLAYER_NAME} (.*)");
        matcher.add_rule(&[chat.as_str()], move |matches| {
            if let (Some(name), Some(message)) = (matches[0].group(2), matches[0].group(4)) {
                link.send("Chat", json!({ "name": name, "message": message }));
            }
        })?;
    }
    {
        let link = link.clone();
        let console = console.clone();
        let joined = format!("{PLAYER_NAME} joined the game");
        matcher.add_rule(&[joined.as_str()], move |matches| {
            if let Some(name) = matches[0].group(2) {
                link.send("Players-Join", json!({ "name": name }));
                // Refresh the roster after every membership change.
                let _ = console.send("list".to_string());
            }
        })?;
    }
    {
        let link = link.clone();
        let console = console.clone();
        let left = format!("{PLAYER_NAME} left the game");
        matcher.add_rule(&[left.as_str()], move |matches| {
            if let Some(name) = matches[0].group(2) {
                link.send("Players-Leave", json!({ "name": name }));
                let _ = console.send("list".to_string());
            }
        })?;
    }
    {
        let link = link.clone();
        matcher.add_rule(
            &["There are [0-9]+/[0-9]+ players online:", ".*"],
            move |matches| {
                let roster_line = matches[1].line();
                let players: Vec<Value> = if roster_line.is_empty() {
                    Vec::new()
                } else {
                    roster_line
                        .split(", ")
                        .map(|name| json!({ "name": name }))
                        .collect()
                };
                link.send("Players-List", json!({ "players": players }));
            },
        )?;
    }
    Ok(())
}

/// The wrapper's role behavior in the shared client state machine.
pub struct WrapperRole {
    link: Arc<CoreLink>,
    console: UnboundedSender<String>,
    init_payload: Value,
    data_directory: PathBuf,
}

impl WrapperRole {
    pub fn new(
        link: Arc<CoreLink>,
        console: UnboundedSender<String>,
        init_payload: Value,
        data_directory: PathBuf,
    ) -> Self {
        Self {
            link,
            console,
            init_payload,
            data_directory,
        }
    }
}

#[async_trait]
impl RoleClient for WrapperRole {
    async fn on_open(&self, session: &Arc<Protocol>) {
        {
            let console = self.console.clone();
            session.add_command("Players-List", move |_, _| {
                let _ = console.send("list".to_string());
                Ok(())
            });
        }
        {
            let console = self.console.clone();
            session.add_command("Command", move |_, payload| {
                if let Some(command) = payload.get("command").and_then(Value::as_str) {
                    let _ = console.send(command.to_string());
                }
                if let Some(commands) = payload.get("commands").and_then(Value::as_array) {
                    for command in commands.iter().filter_map(Value::as_str) {
                        let _ = console.send(command.to_string());
                    }
                }
                Ok(())
            });
        }
        register_directory_access(session, self.data_directory.clone());

        self.link.attach(session.clone());
        // Announce immediately; the command family on the core side only
        // opens up after this.
        session.send("Wrapper-Init", self.init_payload.clone());
    }

    async fn on_close(&self) {
        self.link.detach();
    }
}
