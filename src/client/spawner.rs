//! Tool-server process spawning and lifecycle supervision.
//!
//! Spawns the server with all three stdio streams piped and
//! `kill_on_drop(true)`, so the child is released on every exit path —
//! including early-return failures during the handshake. Termination is a
//! two-step discipline: a graceful stop signal, then a bounded wait. A child
//! that outlives the bound is a liveness failure surfaced to the caller; the
//! forced kill is a separate, explicit operation, never implied.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use crate::{AppError, Result};

/// Spawn the server executable with piped stdio.
///
/// # Errors
///
/// [`AppError::Spawn`] when the OS refuses to launch the executable or a
/// stdio stream cannot be captured.
pub fn spawn_server(command: &str, args: &[String]) -> Result<ServerProcess> {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn {command}: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture server stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture server stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture server stderr".into()))?;

    info!(
        pid = child.id().unwrap_or(0),
        command, "tool server spawned"
    );

    Ok(ServerProcess {
        child,
        stdin: Some(stdin),
        stdout: Some(stdout),
        stderr: Some(stderr),
        stop_requested: false,
    })
}

/// A running tool-server child and its captured stdio streams.
///
/// The process is exclusively owned: exactly one session drives it, and it
/// must not outlive that session. `kill_on_drop` backs the ownership
/// guarantee when a failure path drops the handle early.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    stop_requested: bool,
}

impl ServerProcess {
    /// Take the child's stdin; `None` once taken.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Take the child's stdout; `None` once taken.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Take the child's stderr; `None` once taken.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// OS process id, if the child has not been reaped yet.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Request graceful termination.
    ///
    /// Sends `SIGTERM` on Unix (the child gets a chance to flush and exit);
    /// elsewhere falls back to the runtime's kill request. Idempotent: a
    /// repeat call, or a call after the child already exited, is a no-op —
    /// the child is never re-spawned or re-signalled.
    ///
    /// # Errors
    ///
    /// [`AppError::Io`] when the stop signal cannot be delivered to a child
    /// that is still running.
    pub fn terminate(&mut self) -> Result<()> {
        if self.stop_requested {
            return Ok(());
        }

        // A child that already exited needs no signal.
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!(status = %describe_exit(status), "server already exited before terminate");
            self.stop_requested = true;
            return Ok(());
        }

        self.send_stop_signal()?;
        self.stop_requested = true;
        Ok(())
    }

    /// Block up to `bound` for the child to exit.
    ///
    /// # Errors
    ///
    /// [`AppError::Liveness`] when the child is still running after `bound`
    /// — a hung server is a bug to diagnose, so the caller decides what
    /// happens next (typically [`ServerProcess::force_kill`]).
    /// [`AppError::Io`] when the wait itself fails.
    pub async fn wait_with_timeout(&mut self, bound: Duration) -> Result<std::process::ExitStatus> {
        match tokio::time::timeout(bound, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(status = %describe_exit(status), "tool server exited");
                self.stop_requested = true;
                Ok(status)
            }
            Ok(Err(err)) => Err(AppError::Io(format!("wait for server exit failed: {err}"))),
            Err(_elapsed) => Err(AppError::Liveness(format!(
                "server still running {bound:?} after the stop request"
            ))),
        }
    }

    /// Forcibly kill the child. Explicit escalation after a liveness
    /// failure; never invoked implicitly.
    ///
    /// # Errors
    ///
    /// [`AppError::Io`] when the kill fails.
    pub async fn force_kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|err| AppError::Io(format!("failed to kill server: {err}")))?;
        self.stop_requested = true;
        info!("tool server killed");
        Ok(())
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    #[cfg(unix)]
    fn send_stop_signal(&mut self) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        // No pid means the runtime already reaped the child.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let raw = i32::try_from(pid)
            .map_err(|_| AppError::Io(format!("server pid {pid} out of signal range")))?;

        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => {
                info!(pid, "sent SIGTERM to tool server");
                Ok(())
            }
            // Exited between try_wait and the signal.
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(err) => Err(AppError::Io(format!(
                "failed to signal server pid {pid}: {err}"
            ))),
        }
    }

    #[cfg(not(unix))]
    fn send_stop_signal(&mut self) -> Result<()> {
        self.child
            .start_kill()
            .map_err(|err| AppError::Io(format!("failed to stop server: {err}")))
    }
}

/// Render an exit status for logging.
fn describe_exit(status: std::process::ExitStatus) -> String {
    if status.success() {
        "exited normally (code 0)".to_owned()
    } else {
        status.code().map_or_else(
            || "terminated by signal".to_owned(),
            |code| format!("exited with code {code}"),
        )
    }
}
