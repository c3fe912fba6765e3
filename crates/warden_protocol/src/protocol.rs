//! Named-command dispatch over an authenticated transport.
//!
//! A [`Protocol`] owns one side of a session after the handshake has
//! completed. Arriving frames are dispatched to the handler registered under
//! the frame's command name; frames with no registered handler are dropped
//! with a log line, which is not a protocol error. Handlers may register
//! further commands at any point, notably to gate a command family behind a
//! one-time init command.
//!
//! Sends are fire-and-forget. Request/response correlation is by
//! convention: the requester installs a [`Protocol::command_hook`] for the
//! response's command name before sending, at most one outstanding logical
//! request per command name per session.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::ProtocolError;
use crate::events::EventBus;
use crate::message::Message;
use crate::transport::Transport;

type Handler = Arc<dyn Fn(&Arc<Protocol>, Value) -> Result<(), ProtocolError> + Send + Sync>;

#[derive(Clone)]
struct CommandEntry {
    handler: Handler,
    once: bool,
}

enum CloseHooks {
    Pending(Vec<Box<dyn FnOnce() + Send>>),
    Fired,
}

/// One authenticated session endpoint.
///
/// Cheap to share as `Arc<Protocol>`; handlers receive the owning `Arc` so
/// they can reply, register more commands or move the session into spawned
/// tasks.
pub struct Protocol {
    id: String,
    transport: Arc<Transport>,
    commands: DashMap<String, CommandEntry>,
    events: EventBus,
    close_hooks: std::sync::Mutex<CloseHooks>,
}

impl Protocol {
    /// Creates a session endpoint over an authenticated transport.
    ///
    /// `id` is the identity the remote authenticated as: a UUID string for
    /// wrappers and kickstarters, an account name for shells.
    pub fn new(id: impl Into<String>, transport: Arc<Transport>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            transport,
            commands: DashMap::new(),
            events: EventBus::new(),
            close_hooks: std::sync::Mutex::new(CloseHooks::Pending(Vec::new())),
        })
    }

    /// The authenticated identity string of the remote end.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The session's event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Registers a handler under a command name, replacing any previous one.
    pub fn add_command<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Arc<Protocol>, Value) -> Result<(), ProtocolError> + Send + Sync + 'static,
    {
        self.commands.insert(
            name.into(),
            CommandEntry {
                handler: Arc::new(handler),
                once: false,
            },
        );
    }

    /// Registers a one-shot handler, removed after its first invocation.
    ///
    /// Installing a hook replaces any previous hook or handler under the
    /// same name, which keeps at most one outstanding logical request per
    /// command name.
    pub fn command_hook<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Arc<Protocol>, Value) -> Result<(), ProtocolError> + Send + Sync + 'static,
    {
        self.commands.insert(
            name.into(),
            CommandEntry {
                handler: Arc::new(handler),
                once: true,
            },
        );
    }

    /// Sends a command frame, fire-and-forget.
    ///
    /// A send on a closed or closing session is silently dropped; the
    /// session teardown path is the place that reports the closed state.
    pub fn send(&self, command: &str, payload: Value) {
        let message = Message::new(command, payload);
        match message.encode() {
            Ok(frame) => {
                if self.transport.send(frame).is_err() {
                    trace!(session = %self.id, command, "dropping send on closed session");
                }
            }
            Err(e) => debug!(session = %self.id, command, "failed to encode message: {e}"),
        }
    }

    /// Requests a graceful close.
    ///
    /// The session's pump loop finishes the handler it is running, then
    /// observes the closed transport and runs close hooks exactly once.
    pub fn request_close(&self) {
        self.transport.close();
    }

    /// Whether the underlying transport is closed.
    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Completes once the underlying transport is closed.
    pub async fn closed(&self) {
        self.transport.closed().await;
    }

    /// Registers a hook to run when the session closes.
    ///
    /// Hooks run exactly once, after the pump loop ends. Registering a hook
    /// on an already-closed session runs it immediately.
    pub fn add_close_hook<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let run_now = {
            let Ok(mut hooks) = self.close_hooks.lock() else {
                return;
            };
            match &mut *hooks {
                CloseHooks::Pending(pending) => {
                    pending.push(Box::new(hook));
                    None
                }
                CloseHooks::Fired => Some(hook),
            }
        };
        if let Some(hook) = run_now {
            hook();
        }
    }

    /// Pumps inbound frames until the transport closes or a handler reports
    /// a protocol violation.
    ///
    /// Close hooks run exactly once on every exit path. A violation closes
    /// the transport and is returned to the caller; it is fatal to this
    /// session only.
    pub async fn run(self: &Arc<Self>) -> Result<(), ProtocolError> {
        let result = self.pump().await;
        self.transport.close();
        self.fire_close_hooks();
        result
    }

    async fn pump(self: &Arc<Self>) -> Result<(), ProtocolError> {
        while let Some(frame) = self.transport.recv().await {
            self.dispatch(frame)?;
        }
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, frame: Vec<u8>) -> Result<(), ProtocolError> {
        let message = Message::decode(&frame)?;
        let entry = match self.commands.get(&message.command) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!(session = %self.id, command = %message.command, "dropping unknown command");
                return Ok(());
            }
        };
        if entry.once {
            self.commands
                .remove_if(&message.command, |_, current| current.once);
        }
        (entry.handler)(self, message.payload)
    }

    fn fire_close_hooks(&self) {
        let hooks = {
            let Ok(mut slot) = self.close_hooks.lock() else {
                return;
            };
            match std::mem::replace(&mut *slot, CloseHooks::Fired) {
                CloseHooks::Pending(hooks) => hooks,
                CloseHooks::Fired => Vec::new(),
            }
        };
        for hook in hooks {
            hook();
        }
    }
}
