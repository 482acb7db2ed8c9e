//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// A well-formed `error` response from the server is deliberately absent
/// here: it is legitimate protocol output, not a local failure, and is
/// surfaced through the call return channel as
/// [`CallOutcome::Remote`](crate::client::envelope::CallOutcome::Remote).
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Server executable could not be launched.
    Spawn(String),
    /// Initialize exchange failed before the session was established:
    /// premature stream close, an undecodable response, or an error outcome.
    Handshake(String),
    /// A line from the server is not valid wire JSON or carries neither a
    /// `result` nor an `error` member.
    Decode(String),
    /// Response id does not match the outstanding request id.
    Correlation(String),
    /// A bounded wait for a response elapsed.
    Timeout(String),
    /// The child process did not exit within the termination bound.
    Liveness(String),
    /// Operation attempted in a session state that does not permit it.
    Protocol(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Handshake(msg) => write!(f, "handshake: {msg}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::Correlation(msg) => write!(f, "correlation: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Liveness(msg) => write!(f, "liveness: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
