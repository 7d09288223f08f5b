//! Runtime process launcher.
//!
//! Spawns the runtime with:
//! - `kill_on_drop(true)` so an abandoned session never leaks a process.
//! - Piped stdout/stderr, each pumped line by line into the session loop as
//!   [`SessionInput::RuntimeOutput`].
//! - An exit monitor that reports [`SessionInput::RuntimeExited`] unless the
//!   process was killed on purpose through [`RuntimeHandle::kill`].

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::SessionInput;
use crate::{AppError, Result};

/// Which output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output; scanned for script errors.
    Stdout,
    /// Standard error.
    Stderr,
}

impl OutputStream {
    /// Category of the `output` event the line is relayed under.
    #[must_use]
    pub fn category(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Handle to a launched runtime. Killing is fire-and-forget: teardown never
/// waits for the process to exit.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    kill: CancellationToken,
    pid: Option<u32>,
}

impl RuntimeHandle {
    /// Handle that kills the runtime when `kill` is cancelled.
    #[must_use]
    pub fn new(kill: CancellationToken, pid: Option<u32>) -> Self {
        Self { kill, pid }
    }

    /// OS process id, when known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Request termination of the runtime. Idempotent.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    /// Whether [`RuntimeHandle::kill`] was called.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.kill.is_cancelled()
    }
}

/// Starts the runtime for a session.
pub trait RuntimeLauncher: Send + Sync {
    /// Launch the runtime executable.
    ///
    /// `endpoint` is the URL of the bound agent endpoint. Output lines and
    /// the exit notification are delivered through `input_tx`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the process cannot be started.
    fn launch<'a>(
        &'a self,
        exe: &'a Path,
        endpoint: &'a str,
        input_tx: mpsc::Sender<SessionInput>,
    ) -> Pin<Box<dyn Future<Output = Result<RuntimeHandle>> + Send + 'a>>;
}

/// Launches the runtime as an OS child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl RuntimeLauncher for ProcessLauncher {
    fn launch<'a>(
        &'a self,
        exe: &'a Path,
        endpoint: &'a str,
        input_tx: mpsc::Sender<SessionInput>,
    ) -> Pin<Box<dyn Future<Output = Result<RuntimeHandle>> + Send + 'a>> {
        Box::pin(async move {
            debug!(endpoint, "launching runtime process");
            spawn_runtime(exe, input_tx)
        })
    }
}

/// Spawn `exe` and wire its output and exit into the session loop.
///
/// # Errors
///
/// - `AppError::Spawn("failed to spawn runtime: …")` on OS spawn failure.
/// - `AppError::Spawn("failed to capture …")` if a pipe is missing.
pub fn spawn_runtime(exe: &Path, input_tx: mpsc::Sender<SessionInput>) -> Result<RuntimeHandle> {
    let mut child = Command::new(exe)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| {
            AppError::Spawn(format!("failed to spawn runtime {}: {err}", exe.display()))
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture runtime stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture runtime stderr".into()))?;

    let pid = child.id();
    info!(pid, exe = %exe.display(), "runtime process started");

    tokio::spawn(pump_lines(stdout, OutputStream::Stdout, input_tx.clone()));
    tokio::spawn(pump_lines(stderr, OutputStream::Stderr, input_tx.clone()));

    let kill = CancellationToken::new();
    tokio::spawn(monitor_exit(child, input_tx, kill.clone()));

    Ok(RuntimeHandle::new(kill, pid))
}

/// Forward every line of `output` as [`SessionInput::RuntimeOutput`].
///
/// Lines are split on `\n` with a trailing `\r` removed; invalid UTF-8 is
/// replaced rather than dropped.
pub async fn pump_lines<R>(output: R, stream: OutputStream, input_tx: mpsc::Sender<SessionInput>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_owned();
                if input_tx
                    .send(SessionInput::RuntimeOutput { stream, line })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(err) => {
                warn!(stream = stream.category(), %err, "runtime output read failed");
                break;
            }
        }
    }

    debug!(stream = stream.category(), "runtime output closed");
}

async fn monitor_exit(
    mut child: Child,
    input_tx: mpsc::Sender<SessionInput>,
    kill: CancellationToken,
) {
    tokio::select! {
        result = child.wait() => {
            let code = match result {
                Ok(status) => {
                    info!(?status, "runtime process exited");
                    status.code()
                }
                Err(err) => {
                    warn!(%err, "error waiting for runtime process");
                    None
                }
            };

            if input_tx.send(SessionInput::RuntimeExited { code }).await.is_err() {
                debug!("session loop gone before RuntimeExited could be delivered");
            }
        }
        () = kill.cancelled() => {
            if let Err(err) = child.start_kill() {
                debug!(%err, "runtime process already gone");
            }
            // Reap in the background; teardown does not wait for this.
            let _ = child.wait().await;
            info!("runtime process killed");
        }
    }
}
