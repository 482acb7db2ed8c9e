//! Shared fixtures for the integration suite.
//!
//! The protocol engine is generic over its byte streams, so most scenarios
//! run against an in-memory scripted server over duplex pipes — no process,
//! no file system. Lifecycle tests that need a real child live in
//! `lifecycle_tests` and spawn `/bin/sh`.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

use mcp_probe::client::protocol::{ClientHello, ProtocolClient};

/// Capacity of the in-memory stdio pipes.
const PIPE_BYTES: usize = 64 * 1024;

/// In-memory stdio wiring between a client and a scripted server.
pub struct Wire {
    pub client_read: DuplexStream,
    pub client_write: DuplexStream,
    pub server_read: DuplexStream,
    pub server_write: DuplexStream,
}

/// Build the two unidirectional pipes a session would normally get from the
/// child's stdout/stdin.
pub fn wire() -> Wire {
    let (client_read, server_write) = tokio::io::duplex(PIPE_BYTES);
    let (server_read, client_write) = tokio::io::duplex(PIPE_BYTES);
    Wire {
        client_read,
        client_write,
        server_read,
        server_write,
    }
}

/// A client with generous bounds — tests that exercise timeouts build their
/// own via [`client_with_timeouts`].
pub fn client(
    read: DuplexStream,
    write: DuplexStream,
) -> ProtocolClient<DuplexStream, DuplexStream> {
    client_with_timeouts(read, write, Duration::from_secs(5), Duration::from_secs(5))
}

pub fn client_with_timeouts(
    read: DuplexStream,
    write: DuplexStream,
    handshake: Duration,
    call: Duration,
) -> ProtocolClient<DuplexStream, DuplexStream> {
    ProtocolClient::new(read, write, handshake, call)
}

/// The capability declaration used across the suite.
pub fn hello() -> ClientHello {
    ClientHello {
        protocol_version: "2024-11-05".to_owned(),
        capabilities: json!({"roots": {"listChanged": false}, "sampling": {}}),
        name: "mcp-probe-tests".to_owned(),
        version: "0.0.0".to_owned(),
    }
}

/// Standard initialize response for request id 1.
pub fn init_reply() -> String {
    r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#.to_owned()
}

/// Scripted server task: answers the handshake with `init_reply` (or closes
/// the stream without answering when `None`), consumes the `initialized`
/// notification, then replies to each subsequent request line with the next
/// canned reply. Returns every request line it saw, in order.
pub fn scripted_server(
    read: DuplexStream,
    write: DuplexStream,
    init_reply: Option<String>,
    replies: Vec<String>,
) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();
        let mut reader = BufReader::new(read);
        let mut write = write;
        let mut line = String::new();

        // initialize request
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            return seen;
        }
        seen.push(line.trim().to_owned());

        let Some(reply) = init_reply else {
            // Premature close: drop both halves without answering.
            return seen;
        };
        send_line(&mut write, &reply).await;

        // notifications/initialized
        line.clear();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            return seen;
        }
        seen.push(line.trim().to_owned());

        for reply in replies {
            line.clear();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return seen;
            }
            seen.push(line.trim().to_owned());
            send_line(&mut write, &reply).await;
        }

        seen
    })
}

/// Write one newline-terminated line to the server's outbound pipe.
pub async fn send_line(write: &mut DuplexStream, line: &str) {
    write.write_all(line.as_bytes()).await.ok();
    write.write_all(b"\n").await.ok();
}

/// Parse a captured request line for assertions.
pub fn parse(line: &str) -> Value {
    serde_json::from_str(line).expect("request line must be valid json")
}
