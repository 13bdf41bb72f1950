//! Playout subprocess management
//!
//! Spawns the long-running encode/mux process (or the passthrough
//! re-streamer), pumps its stderr into the engine channel, and reports its
//! exit. The playout tool redraws progress with carriage returns rather than
//! newlines, so the pump splits on both.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::playout::events::EngineEvent;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::info;

/// Handle to a spawned playout subprocess
pub struct PlayoutHandle {
    pid: Option<u32>,
    stderr_task: JoinHandle<()>,
    wait_task: JoinHandle<()>,
}

impl PlayoutHandle {
    /// Stop forwarding stderr lines. Part of the shutdown sequence: progress
    /// listeners detach before the process is signalled.
    pub fn detach_output(&self) {
        self.stderr_task.abort();
    }

    /// Ask the playout process to terminate and wait for it to exit.
    pub async fn terminate(self) -> Result<()> {
        self.stderr_task.abort();
        if let Some(pid) = self.pid {
            let _ = Command::new("kill").arg(pid.to_string()).status().await;
        }
        let _ = self.wait_task.await;
        Ok(())
    }
}

/// Spawn the looping broadcast process over the slot ring.
///
/// Arguments follow the playout script contract: slots directory, index-list
/// file name, ingest endpoint. Stderr is the progress stream.
pub fn spawn_playout(config: &Config, tx: UnboundedSender<EngineEvent>) -> Result<PlayoutHandle> {
    spawn(
        &config.playout_command,
        &[
            config.slots_directory.to_string_lossy().as_ref(),
            config.list_name.as_str(),
            config.ingest_endpoint.as_str(),
        ],
        tx,
    )
}

/// Spawn the passthrough re-streamer for an existing playlist.
pub fn spawn_restream(
    config: &Config,
    playlist: &str,
    tx: UnboundedSender<EngineEvent>,
) -> Result<PlayoutHandle> {
    spawn(
        &config.restream_command,
        &[playlist, config.ingest_endpoint.as_str()],
        tx,
    )
}

fn spawn(command: &str, args: &[&str], tx: UnboundedSender<EngineEvent>) -> Result<PlayoutHandle> {
    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Spawn(format!("{command}: {e}")))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Spawn(format!("{command}: stderr not captured")))?;
    let pid = child.id();

    let stderr_task = tokio::spawn(pump_stderr(stderr, tx.clone()));
    let wait_task = tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                let code = status.code();
                #[cfg(unix)]
                let signal = std::os::unix::process::ExitStatusExt::signal(&status);
                #[cfg(not(unix))]
                let signal: Option<i32> = None;

                match (code, signal) {
                    (Some(code), _) => info!("playout process exited with code {code}"),
                    (None, Some(signal)) => {
                        info!("playout process exited after receiving signal {signal}")
                    }
                    (None, None) => info!("playout process exited"),
                }
                let _ = tx.send(EngineEvent::PlayoutExited { code, signal });
            }
            Err(e) => {
                info!("playout process wait failed: {e}");
                let _ = tx.send(EngineEvent::PlayoutExited {
                    code: None,
                    signal: None,
                });
            }
        }
    });

    Ok(PlayoutHandle {
        pid,
        stderr_task,
        wait_task,
    })
}

/// Forward stderr output line by line, splitting on both `\r` and `\n`.
async fn pump_stderr(mut stderr: ChildStderr, tx: UnboundedSender<EngineEvent>) {
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                while let Some(pos) = pending.iter().position(|&b| b == b'\r' || b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line[..pos]).trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if tx.send(EngineEvent::Progress(line)).is_err() {
                        return;
                    }
                }
            }
        }
    }
}
