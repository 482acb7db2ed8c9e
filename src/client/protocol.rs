//! Handshake and tool-call state machine.
//!
//! The client is strictly one-outstanding-request: every request line is
//! answered by the next response line. Correlation therefore reduces to "the
//! next line read answers the most recent write", but the response id is
//! still checked on every exchange so server misbehavior surfaces as a
//! [`AppError::Correlation`] instead of being trusted positionally.
//!
//! States: `Unstarted → Handshaking → Ready → (ToolCalling → Ready)* →
//! Closed`, with `Errored` reachable from any non-terminal state. `Errored`
//! is terminal for protocol purposes — no further wire traffic is attempted,
//! though the owning session may still run shutdown.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedRead;
use tracing::{debug, info};

use crate::client::codec::LineCodec;
use crate::client::envelope::{
    self, CallOutcome, ResponseOutcome, ToolDescriptor, WireResponse,
};
use crate::{AppError, Result};

/// Fixed id carried by the `initialize` request.
pub const INITIALIZE_ID: i64 = 1;

/// Client identity and capability declaration, exchanged once per session
/// and immutable after the handshake completes.
#[derive(Debug, Clone)]
pub struct ClientHello {
    /// Protocol revision the client speaks (e.g. `2024-11-05`).
    pub protocol_version: String,
    /// Capability flags advertised to the server.
    pub capabilities: Value,
    /// Client name reported in `clientInfo`.
    pub name: String,
    /// Client version reported in `clientInfo`.
    pub version: String,
}

/// Protocol connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No handshake attempted yet.
    Unstarted,
    /// `initialize` sent; waiting for the response.
    Handshaking,
    /// Handshake complete; tool calls may be issued.
    Ready,
    /// A tool call is in flight.
    ToolCalling,
    /// Unrecoverable protocol failure; no further calls are attempted.
    Errored,
    /// Session torn down.
    Closed,
}

/// JSON-RPC client over a reader/writer pair.
///
/// Generic over the byte streams so tests can drive it with in-memory pipes
/// while the session drives it with the child process's stdout/stdin.
#[derive(Debug)]
pub struct ProtocolClient<R, W> {
    reader: FramedRead<R, LineCodec>,
    writer: W,
    state: ClientState,
    next_id: i64,
    handshake_timeout: Duration,
    call_timeout: Duration,
}

impl<R, W> ProtocolClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Create a client over `reader`/`writer` with the given bounded waits.
    #[must_use]
    pub fn new(reader: R, writer: W, handshake_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            reader: FramedRead::new(reader, LineCodec::new()),
            writer,
            state: ClientState::Unstarted,
            next_id: INITIALIZE_ID,
            handshake_timeout,
            call_timeout,
        }
    }

    /// Current protocol state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Perform the `initialize`/`initialized` handshake.
    ///
    /// Sends the `initialize` request carrying `hello`, blocks for exactly
    /// one response line under the handshake bound, then sends the
    /// `notifications/initialized` notification and becomes `Ready`. Returns
    /// the server's `result` payload (its capabilities and identity).
    ///
    /// # Errors
    ///
    /// [`AppError::Protocol`] when called in any state other than
    /// `Unstarted`. [`AppError::Handshake`] when the stream closes before a
    /// response arrives, the bound elapses, the line fails to decode, the
    /// response answers a different id, or the outcome is an error. All
    /// handshake failures leave the client `Errored`.
    pub async fn initialize(&mut self, hello: &ClientHello) -> Result<Value> {
        if self.state != ClientState::Unstarted {
            return Err(AppError::Protocol(format!(
                "initialize attempted in state {:?}",
                self.state
            )));
        }
        self.state = ClientState::Handshaking;

        let id = self.take_id();
        let params = json!({
            "protocolVersion": hello.protocol_version,
            "capabilities": hello.capabilities,
            "clientInfo": {
                "name": hello.name,
                "version": hello.version,
            },
        });

        let request = envelope::encode_request(id, "initialize", &params);
        if let Err(err) = self.write_line(&request).await {
            self.state = ClientState::Errored;
            return Err(AppError::Handshake(format!(
                "failed to send initialize: {err}"
            )));
        }
        debug!(id, "initialize sent");

        let line = match self.read_line_within(self.handshake_timeout).await {
            Ok(Some(line)) => line,
            Ok(None) => {
                self.state = ClientState::Errored;
                return Err(AppError::Handshake(
                    "end of stream before the initialize response".into(),
                ));
            }
            Err(err) => {
                self.state = ClientState::Errored;
                return Err(AppError::Handshake(format!(
                    "server never responded to initialize: {err}"
                )));
            }
        };

        let response = match envelope::decode_response(&line) {
            Ok(response) => response,
            Err(err) => {
                self.state = ClientState::Errored;
                return Err(AppError::Handshake(format!(
                    "undecodable initialize response: {err}"
                )));
            }
        };

        if response.id != Some(id) {
            self.state = ClientState::Errored;
            return Err(AppError::Handshake(format!(
                "initialize response answered id {:?}, expected {id}",
                response.id
            )));
        }

        let server_info = match response.outcome {
            ResponseOutcome::Success(value) => value,
            ResponseOutcome::Error(remote) => {
                self.state = ClientState::Errored;
                return Err(AppError::Handshake(format!(
                    "server rejected initialize: code {}: {}",
                    remote.code, remote.message
                )));
            }
        };

        // The server expects the acknowledgement before any tool traffic.
        let notification = envelope::encode_notification("notifications/initialized", None);
        if let Err(err) = self.write_line(&notification).await {
            self.state = ClientState::Errored;
            return Err(AppError::Handshake(format!(
                "failed to send initialized notification: {err}"
            )));
        }

        self.state = ClientState::Ready;
        info!("handshake complete");
        Ok(server_info)
    }

    /// Invoke a server-side tool and block for its single response.
    ///
    /// Arguments are passed through unvalidated — argument validation is the
    /// server's responsibility. A well-formed error response is returned as
    /// [`CallOutcome::Remote`] and leaves the session `Ready`; only
    /// transport and framing failures poison the session.
    ///
    /// # Errors
    ///
    /// [`AppError::Protocol`] when the client is not `Ready`;
    /// [`AppError::Io`] on write failure or stream close;
    /// [`AppError::Timeout`] when the call bound elapses;
    /// [`AppError::Decode`] / [`AppError::Correlation`] on an undecodable or
    /// misaddressed response. All of these leave the client `Errored`.
    pub async fn call_tool(&mut self, name: &str, arguments: &Value) -> Result<CallOutcome> {
        self.ensure_ready("tools/call")?;
        self.state = ClientState::ToolCalling;

        let id = self.take_id();
        let params = json!({
            "name": name,
            "arguments": arguments,
        });

        let response = self.round_trip(id, "tools/call", &params).await?;
        self.state = ClientState::Ready;

        match response.outcome {
            ResponseOutcome::Success(value) => Ok(CallOutcome::Success(value)),
            ResponseOutcome::Error(remote) => Ok(CallOutcome::Remote(remote)),
        }
    }

    /// Ask the server for its tool inventory.
    ///
    /// # Errors
    ///
    /// Everything [`ProtocolClient::call_tool`] can return, plus
    /// [`AppError::Decode`] when the result payload lacks a well-formed
    /// `tools` array, and [`AppError::Protocol`] when the server rejects the
    /// listing itself — a server that cannot enumerate its tools is not
    /// usable as a tool server. The session stays `Ready` in that last case.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        self.ensure_ready("tools/list")?;
        self.state = ClientState::ToolCalling;

        let id = self.take_id();
        let response = self.round_trip(id, "tools/list", &json!({})).await?;
        self.state = ClientState::Ready;

        match response.outcome {
            ResponseOutcome::Success(value) => envelope::parse_tool_list(&value),
            ResponseOutcome::Error(remote) => Err(AppError::Protocol(format!(
                "server rejected tools/list: code {}: {}",
                remote.code, remote.message
            ))),
        }
    }

    /// Flush and close the outbound stream, ending the protocol session.
    ///
    /// Safe to call in any state; subsequent calls fail with
    /// [`AppError::Protocol`].
    pub async fn close(&mut self) {
        if self.state == ClientState::Closed {
            return;
        }
        self.writer.shutdown().await.ok();
        self.state = ClientState::Closed;
        debug!("protocol client closed");
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// Reject any operation while the client is not `Ready`.
    fn ensure_ready(&self, operation: &str) -> Result<()> {
        if self.state == ClientState::Ready {
            Ok(())
        } else {
            Err(AppError::Protocol(format!(
                "{operation} attempted in state {:?}",
                self.state
            )))
        }
    }

    /// Allocate the next request id. Ids are unique and monotonically
    /// increasing within a session.
    fn take_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Write one request line and read its single response under the call
    /// bound, enforcing id correlation. Any failure poisons the client.
    async fn round_trip(&mut self, id: i64, method: &str, params: &Value) -> Result<WireResponse> {
        let request = envelope::encode_request(id, method, params);
        if let Err(err) = self.write_line(&request).await {
            self.state = ClientState::Errored;
            return Err(err);
        }
        debug!(id, method, "request sent");

        let line = match self.read_line_within(self.call_timeout).await {
            Ok(Some(line)) => line,
            Ok(None) => {
                self.state = ClientState::Errored;
                return Err(AppError::Io(format!(
                    "end of stream while awaiting the response to id {id}"
                )));
            }
            Err(err) => {
                self.state = ClientState::Errored;
                return Err(err);
            }
        };

        let response = match envelope::decode_response(&line) {
            Ok(response) => response,
            Err(err) => {
                self.state = ClientState::Errored;
                return Err(err);
            }
        };

        // Strict correlation: a mismatch means the server answered a request
        // that is not outstanding. There is no resynchronization strategy for
        // a one-outstanding-request line protocol, so the session ends here.
        if response.id != Some(id) {
            self.state = ClientState::Errored;
            return Err(AppError::Correlation(format!(
                "response answered id {:?}, expected {id}",
                response.id
            )));
        }

        Ok(response)
    }

    /// Append the line terminator, write, and flush.
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.writer
            .write_all(&bytes)
            .await
            .map_err(|err| AppError::Io(format!("write failed: {err}")))?;
        self.writer
            .flush()
            .await
            .map_err(|err| AppError::Io(format!("flush failed: {err}")))
    }

    /// Read one complete line, `Ok(None)` on end-of-stream.
    ///
    /// # Errors
    ///
    /// [`AppError::Timeout`] when `bound` elapses first; framing and I/O
    /// errors surface from the codec.
    async fn read_line_within(&mut self, bound: Duration) -> Result<Option<String>> {
        match tokio::time::timeout(bound, self.reader.next()).await {
            Ok(Some(Ok(line))) => Ok(Some(line)),
            Ok(Some(Err(err))) => Err(err),
            Ok(None) => Ok(None),
            Err(_elapsed) => Err(AppError::Timeout(format!(
                "no response line within {bound:?}"
            ))),
        }
    }
}
