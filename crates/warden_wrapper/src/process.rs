//! Supervision of the wrapped game-server child process.
//!
//! The wrapper owns the game server's stdio: stdout is intercepted line by
//! line (echoed to our own stdout, then fed through the line matcher), and
//! console input arrives over a channel that is drained into the child's
//! stdin. When the child exits, the wrapper exits with it; there is nothing
//! left to wrap.

use std::path::Path;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, warn};

use crate::logparse::{parse_line, LineMatcher};

/// Spawns the game server and wires its stdio.
///
/// `console` lines are written to the child's stdin; stdout lines feed the
/// matcher. The matcher is moved into the reader task and drives all
/// console-derived protocol traffic from there.
pub fn spawn_game_server(
    command: &str,
    workdir: &Path,
    mut matcher: LineMatcher,
    mut console: UnboundedReceiver<String>,
) -> anyhow::Result<()> {
    let mut parts = command.split_whitespace();
    let program = parts.next().context("game server command is empty")?;
    let mut child = Command::new(program)
        .args(parts)
        .current_dir(workdir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("failed to start game server: {command}"))?;

    let mut stdin = child
        .stdin
        .take()
        .context("game server has no stdin handle")?;
    let stdout = child
        .stdout
        .take()
        .context("game server has no stdout handle")?;

    // Console input pump.
    tokio::spawn(async move {
        while let Some(line) = console.recv().await {
            if stdin.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                break;
            }
        }
    });

    // Console output pump: echo, strip the frame, match.
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    println!("{line}");
                    if let Some(body) = parse_line(&line) {
                        matcher.process(body);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read game server output: {e}");
                    break;
                }
            }
        }
    });

    // The wrapper's lifetime is the child's lifetime.
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                warn!("Game server exited: {status}");
                std::process::exit(status.code().unwrap_or(0));
            }
            Err(e) => {
                error!("Failed to wait for game server: {e}");
                std::process::exit(1);
            }
        }
    });

    Ok(())
}
