//! Background drain for the server's error stream.
//!
//! The child writes diagnostics to stderr; if nobody reads them the pipe
//! fills and the child stalls mid-write. The drain task consumes the stream
//! to exhaustion for the session's full lifetime, forwarding lines that pass
//! the filter to the log and demoting the rest. The consumed content has no
//! protocol meaning.
//!
//! The task never propagates failures into the protocol flow — read errors
//! are logged locally and end the task. It is cancelled at session teardown
//! but deliberately not joined before process termination is requested: the
//! child may still be writing diagnostics, and waiting on it first can
//! deadlock.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::codec::LineCodec;
use crate::AppError;

/// Substring-based suppression filter for server diagnostics.
///
/// Servers tag informational lines distinguishably (`INFO`); those are
/// demoted to debug level while anything else — the actionable lines — is
/// forwarded.
#[derive(Debug, Clone, Default)]
pub struct StderrFilter {
    suppress: Vec<String>,
}

impl StderrFilter {
    /// Build a filter that suppresses lines containing any of `suppress`.
    #[must_use]
    pub fn new(suppress: Vec<String>) -> Self {
        Self { suppress }
    }

    /// Whether `line` should be forwarded rather than demoted.
    #[must_use]
    pub fn should_forward(&self, line: &str) -> bool {
        !self.suppress.iter().any(|needle| line.contains(needle))
    }
}

/// Spawn the drain as an independent task.
///
/// Runs until the stream reaches end-of-stream (child exited) or `cancel`
/// fires (session teardown). Dropping the handle detaches the task.
#[must_use]
pub fn spawn_drain<R>(stream: R, filter: StderrFilter, cancel: CancellationToken) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(run_drain(stream, filter, cancel))
}

/// Consume `stream` line-by-line until end-of-stream or cancellation.
pub async fn run_drain<R>(stream: R, filter: StderrFilter, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stream, LineCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("stderr drain: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("stderr drain: server stderr closed");
                        break;
                    }

                    Some(Err(AppError::Decode(msg))) => {
                        // Framing error (e.g. line too long) — skip the line,
                        // keep draining.
                        warn!(error = msg.as_str(), "stderr drain: framing error, skipping");
                    }

                    Some(Err(err)) => {
                        warn!(error = %err, "stderr drain: read error, stopping");
                        break;
                    }

                    Some(Ok(line)) => {
                        if filter.should_forward(&line) {
                            warn!(target: "mcp_probe::server_stderr", "{line}");
                        } else {
                            debug!(target: "mcp_probe::server_stderr", "{line}");
                        }
                    }
                }
            }
        }
    }
}
