//! Stdio tool-server client.
//!
//! This module manages one newline-delimited JSON-RPC session with a spawned
//! tool-server process. The session owns the child and its three stdio
//! streams; the protocol flow is strictly one outstanding request at a time,
//! with a concurrent drain task keeping the child's stderr from backing up.
//!
//! Submodules:
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based line framing
//!   for the wire streams.
//! - `envelope`: JSON-RPC 2.0 envelope encoding and response decoding.
//! - `protocol`: the handshake/tool-call state machine over a reader/writer
//!   pair.
//! - `spawner`: process spawning, graceful termination, and bounded waits.
//! - `stderr`: background drain for the child's error stream.
//! - `session`: ties the above together under exclusive ownership.

pub mod codec;
pub mod envelope;
pub mod protocol;
pub mod session;
pub mod spawner;
pub mod stderr;
