//! Probe configuration parsing and validation.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::protocol::ClientHello;
use crate::{AppError, Result};

/// Tool-server launch settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Server executable path or name.
    pub command: String,
    /// Arguments passed to the server (e.g. `--tools-dir tools`).
    #[serde(default)]
    pub args: Vec<String>,
    /// Pre-handshake delay for servers with nontrivial startup time.
    ///
    /// Zero by default: the handshake response is the readiness gate, and
    /// the delay is an accommodation, not a readiness signal.
    #[serde(default)]
    pub startup_delay_ms: u64,
}

impl ServerConfig {
    /// Startup accommodation as a [`Duration`].
    #[must_use]
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

/// Bounded-wait settings, in seconds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Bound on the wait for the initialize response.
    #[serde(default = "default_handshake_seconds")]
    pub handshake_seconds: u64,
    /// Bound on the wait for each tool-call response. Must be nonzero —
    /// an unbounded blocking read hides a hung server.
    #[serde(default = "default_call_seconds")]
    pub call_seconds: u64,
    /// Bound on the wait for child exit after a stop request.
    #[serde(default = "default_terminate_seconds")]
    pub terminate_seconds: u64,
}

fn default_handshake_seconds() -> u64 {
    30
}

fn default_call_seconds() -> u64 {
    60
}

fn default_terminate_seconds() -> u64 {
    5
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_seconds: default_handshake_seconds(),
            call_seconds: default_call_seconds(),
            terminate_seconds: default_terminate_seconds(),
        }
    }
}

impl TimeoutConfig {
    /// Handshake bound as a [`Duration`].
    #[must_use]
    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_seconds)
    }

    /// Per-call bound as a [`Duration`].
    #[must_use]
    pub fn call(&self) -> Duration {
        Duration::from_secs(self.call_seconds)
    }

    /// Termination bound as a [`Duration`].
    #[must_use]
    pub fn terminate(&self) -> Duration {
        Duration::from_secs(self.terminate_seconds)
    }
}

/// Client identity advertised during the handshake.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Protocol revision to request.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Client name reported in `clientInfo`.
    #[serde(default = "default_client_name")]
    pub name: String,
    /// Client version reported in `clientInfo`.
    #[serde(default = "default_client_version")]
    pub version: String,
}

fn default_protocol_version() -> String {
    "2024-11-05".into()
}

fn default_client_name() -> String {
    env!("CARGO_PKG_NAME").into()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol_version: default_protocol_version(),
            name: default_client_name(),
            version: default_client_version(),
        }
    }
}

/// Stderr forwarding settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StderrConfig {
    /// Lines containing any of these substrings are demoted to debug level
    /// instead of being forwarded.
    #[serde(default = "default_suppress")]
    pub suppress: Vec<String>,
}

fn default_suppress() -> Vec<String> {
    vec!["INFO".into()]
}

impl Default for StderrConfig {
    fn default() -> Self {
        Self {
            suppress: default_suppress(),
        }
    }
}

/// One configured tool invocation in the check suite.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ToolCheck {
    /// Tool name as listed by the server.
    pub tool: String,
    /// Free-form argument mapping, passed through unvalidated — argument
    /// validation is the server's responsibility.
    #[serde(default = "empty_object")]
    pub arguments: Value,
    /// Substring the result's textual `content` field must contain for the
    /// check to pass. When absent, any success outcome passes.
    #[serde(default)]
    pub expect_content: Option<String>,
}

fn empty_object() -> Value {
    json!({})
}

/// Root configuration parsed from `probe.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ProbeConfig {
    /// Tool-server launch settings.
    pub server: ServerConfig,
    /// Bounded-wait settings.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Client identity for the handshake.
    #[serde(default)]
    pub client: ClientConfig,
    /// Stderr forwarding settings.
    #[serde(default)]
    pub stderr: StderrConfig,
    /// Tool checks executed in order after the handshake.
    #[serde(default, rename = "check")]
    pub checks: Vec<ToolCheck>,
}

impl ProbeConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// [`AppError::Config`] on a syntax error or a failed validation rule.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Minimal configuration for a server launched as `command args…`, with
    /// every other setting at its default.
    #[must_use]
    pub fn for_command(command: String, args: Vec<String>) -> Self {
        Self {
            server: ServerConfig {
                command,
                args,
                startup_delay_ms: 0,
            },
            timeouts: TimeoutConfig::default(),
            client: ClientConfig::default(),
            stderr: StderrConfig::default(),
            checks: Vec::new(),
        }
    }

    /// The capability declaration sent in the `initialize` request.
    #[must_use]
    pub fn client_hello(&self) -> ClientHello {
        ClientHello {
            protocol_version: self.client.protocol_version.clone(),
            capabilities: json!({
                "roots": { "listChanged": false },
                "sampling": {},
            }),
            name: self.client.name.clone(),
            version: self.client.version.clone(),
        }
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn validate(&self) -> Result<()> {
        if self.server.command.trim().is_empty() {
            return Err(AppError::Config("server.command must not be empty".into()));
        }
        if self.timeouts.handshake_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.handshake_seconds must be greater than zero".into(),
            ));
        }
        if self.timeouts.call_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.call_seconds must be greater than zero".into(),
            ));
        }
        for check in &self.checks {
            if check.tool.trim().is_empty() {
                return Err(AppError::Config("check.tool must not be empty".into()));
            }
        }
        Ok(())
    }
}
