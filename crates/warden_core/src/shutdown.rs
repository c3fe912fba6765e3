//! Graceful shutdown and crash escalation.
//!
//! The core shuts down on SIGINT/SIGTERM (Ctrl+C on Windows) or when a
//! supervised background task fails. Task failures are the only path that
//! terminates the whole host; session-level failures never do.

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

/// Sets up a shutdown signal handler.
///
/// Returns a receiver triggered once when a termination signal arrives.
///
/// # Platform Support
/// * Unix: SIGINT (Ctrl+C) and SIGTERM
/// * Windows: Ctrl+C events
pub async fn setup_shutdown_handler() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let Ok(mut sigint) = signal(SignalKind::interrupt()) else {
                error!("Failed to create SIGINT handler");
                return;
            };
            let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
                error!("Failed to create SIGTERM handler");
                return;
            };

            tokio::select! {
                _ = sigint.recv() => {
                    info!("SIGINT received - initiating graceful shutdown");
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received - initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            use tokio::signal::windows::ctrl_c;

            let Ok(mut ctrl_c) = ctrl_c() else {
                error!("Failed to create Ctrl+C handler");
                return;
            };
            ctrl_c.recv().await;
            info!("Ctrl+C received - initiating graceful shutdown");
        }

        let _ = tx.send(());
    });

    rx
}

/// Escalation handle for uncaught failures in background tasks.
///
/// Reporting a crash wakes the receiver returned by [`crash_channel`]; the
/// main loop logs, shuts the server down and exits nonzero.
#[derive(Clone)]
pub struct CrashHandler {
    tx: mpsc::UnboundedSender<String>,
}

impl CrashHandler {
    /// Reports a fatal failure from a named background task.
    pub fn report(&self, context: &str, failure: impl std::fmt::Display) {
        error!("{context}: {failure}");
        let _ = self.tx.send(format!("{context}: {failure}"));
    }
}

/// Creates the crash escalation channel.
pub fn crash_channel() -> (CrashHandler, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CrashHandler { tx }, rx)
}
