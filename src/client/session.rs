//! One client/server pairing.
//!
//! A session exclusively owns the spawned child process, the protocol
//! client over its stdin/stdout, and the stderr drain task — the child must
//! not outlive the session, and no two sessions share a process. Teardown is
//! a single idempotent operation that releases the process and both streams
//! on every exit path.

use std::time::Duration;

use serde_json::Value;
use tokio::process::{ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::envelope::{CallOutcome, ToolDescriptor};
use crate::client::protocol::ProtocolClient;
use crate::client::spawner::{self, ServerProcess};
use crate::client::stderr::{self, StderrFilter};
use crate::config::ProbeConfig;
use crate::{AppError, Result};

/// An established session with a spawned tool server.
#[derive(Debug)]
pub struct McpSession {
    process: ServerProcess,
    client: ProtocolClient<ChildStdout, ChildStdin>,
    drain: JoinHandle<()>,
    cancel: CancellationToken,
    terminate_timeout: Duration,
    server_info: Value,
    closed: bool,
}

impl McpSession {
    /// Spawn the configured server, start the stderr drain, and run the
    /// handshake. The session is returned only once the server is `Ready`.
    ///
    /// The optional startup delay is an accommodation for slow-starting
    /// servers, zero by default — the handshake response is the readiness
    /// gate, not the sleep.
    ///
    /// # Errors
    ///
    /// [`AppError::Spawn`] when the executable cannot be launched, and any
    /// handshake failure from
    /// [`ProtocolClient::initialize`]. On every failure path the child is
    /// released: termination is requested and `kill_on_drop` backs it up.
    pub async fn start(config: &ProbeConfig) -> Result<Self> {
        let mut process = spawner::spawn_server(&config.server.command, &config.server.args)?;

        let stdin = process
            .take_stdin()
            .ok_or_else(|| AppError::Spawn("server stdin unavailable".into()))?;
        let stdout = process
            .take_stdout()
            .ok_or_else(|| AppError::Spawn("server stdout unavailable".into()))?;
        let stderr_stream = process
            .take_stderr()
            .ok_or_else(|| AppError::Spawn("server stderr unavailable".into()))?;

        // The drain must be running before any protocol traffic: a chatty
        // server can fill its error pipe during startup.
        let cancel = CancellationToken::new();
        let drain = stderr::spawn_drain(
            stderr_stream,
            StderrFilter::new(config.stderr.suppress.clone()),
            cancel.clone(),
        );

        let delay = config.server.startup_delay();
        if !delay.is_zero() {
            debug!(?delay, "startup accommodation before handshake");
            tokio::time::sleep(delay).await;
        }

        let mut client = ProtocolClient::new(
            stdout,
            stdin,
            config.timeouts.handshake(),
            config.timeouts.call(),
        );

        match client.initialize(&config.client_hello()).await {
            Ok(server_info) => Ok(Self {
                process,
                client,
                drain,
                cancel,
                terminate_timeout: config.timeouts.terminate(),
                server_info,
                closed: false,
            }),
            Err(err) => {
                // Handshake failed — release the child before surfacing the
                // error. The drain ends on its own once stderr closes.
                cancel.cancel();
                if let Err(term_err) = process.terminate() {
                    warn!(error = %term_err, "terminate after failed handshake also failed");
                }
                drain.abort();
                Err(err)
            }
        }
    }

    /// The server's `initialize` result payload (capabilities and identity).
    #[must_use]
    pub fn server_info(&self) -> &Value {
        &self.server_info
    }

    /// Ask the server for its tool inventory.
    ///
    /// # Errors
    ///
    /// See [`ProtocolClient::list_tools`].
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        self.client.list_tools().await
    }

    /// Invoke a server-side tool.
    ///
    /// # Errors
    ///
    /// See [`ProtocolClient::call_tool`].
    pub async fn call_tool(&mut self, name: &str, arguments: &Value) -> Result<CallOutcome> {
        self.client.call_tool(name, arguments).await
    }

    /// Tear the session down: close the outbound stream, request graceful
    /// termination, and wait out the bound. Idempotent — a second call is a
    /// no-op `Ok` and never re-spawns or re-signals.
    ///
    /// The drain is cancelled only after termination has been requested,
    /// never joined first: the child may still be writing diagnostics.
    ///
    /// # Errors
    ///
    /// [`AppError::Liveness`] when the child ignores the stop request past
    /// the bound — cleanup is then the caller's decision
    /// ([`McpSession::force_kill`] being the explicit escalation).
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.client.close().await;
        self.process.terminate()?;
        let waited = self
            .process
            .wait_with_timeout(self.terminate_timeout)
            .await;
        self.cancel.cancel();

        waited.map(|_| ())
    }

    /// Forcibly kill the child after a liveness failure.
    ///
    /// # Errors
    ///
    /// See [`ServerProcess::force_kill`].
    pub async fn force_kill(&mut self) -> Result<()> {
        self.process.force_kill().await
    }
}

impl Drop for McpSession {
    fn drop(&mut self) {
        // The drain task must not outlive the session it belongs to.
        self.cancel.cancel();
        self.drain.abort();
    }
}
