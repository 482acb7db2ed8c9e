#![forbid(unsafe_code)]

//! Client library for JSON-RPC-over-stdio tool servers (MCP-style).
//!
//! Spawns a server process, performs the versioned `initialize`/
//! `initialized` handshake, then issues correlated tool-call requests over
//! newline-delimited JSON — one outstanding request at a time — while a
//! background task drains the child's stderr so it never blocks on a full
//! error pipe.

pub mod client;
pub mod config;
pub mod errors;
pub mod runner;

pub use config::ProbeConfig;
pub use errors::{AppError, Result};
