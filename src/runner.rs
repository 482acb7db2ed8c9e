//! Check runner: drives configured tool calls and reports results.
//!
//! Each check invokes one tool against an established session. A success
//! result passes (optionally gated on its textual content); a well-formed
//! server error fails the check but leaves the session usable; a transport
//! or protocol failure fails the check and stops the suite, since the
//! session is no longer usable after it.

use std::fmt::Write as _;

use serde_json::Value;
use tracing::{error, info};

use crate::client::envelope::CallOutcome;
use crate::client::session::McpSession;
use crate::config::ToolCheck;
use crate::Result;

/// Maximum characters of tool output echoed into the report.
const EXCERPT_CHARS: usize = 200;

/// Result of one executed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Tool name the check invoked.
    pub tool: String,
    /// Whether the call produced the expected success outcome.
    pub passed: bool,
    /// Result excerpt on success, failure description otherwise.
    pub detail: String,
}

/// Aggregate outcome across a check suite.
#[derive(Debug, Clone, Default)]
pub struct Report {
    /// Per-check outcomes in execution order.
    pub outcomes: Vec<CheckOutcome>,
}

impl Report {
    /// Number of passed checks.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    /// Number of checks attempted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether every attempted check passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.passed() == self.total()
    }

    /// Render the per-check lines and the aggregate summary.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for outcome in &self.outcomes {
            let marker = if outcome.passed { "PASS" } else { "FAIL" };
            let _ = writeln!(out, "{marker} {}: {}", outcome.tool, outcome.detail);
        }
        let _ = writeln!(out, "{}/{} checks passed", self.passed(), self.total());
        out
    }
}

/// Execute `checks` in order against an established session.
///
/// Stops early when a call fails at the transport or protocol layer — the
/// session is `Errored` at that point and further calls would fail without
/// touching the wire. The partial report still carries every outcome
/// observed up to and including the failure.
///
/// # Errors
///
/// Currently infallible at this layer (failures are folded into the
/// report), but kept fallible for parity with the session operations it
/// wraps.
pub async fn run_checks(session: &mut McpSession, checks: &[ToolCheck]) -> Result<Report> {
    let mut report = Report::default();

    for check in checks {
        info!(tool = check.tool, "running check");
        match session.call_tool(&check.tool, &check.arguments).await {
            Ok(CallOutcome::Success(result)) => {
                report.outcomes.push(classify_success(check, &result));
            }
            Ok(CallOutcome::Remote(remote)) => {
                // Legitimate protocol output; the session stays usable.
                report.outcomes.push(CheckOutcome {
                    tool: check.tool.clone(),
                    passed: false,
                    detail: format!("server error {}: {}", remote.code, remote.message),
                });
            }
            Err(err) => {
                error!(tool = check.tool, %err, "check ended the session");
                report.outcomes.push(CheckOutcome {
                    tool: check.tool.clone(),
                    passed: false,
                    detail: format!("session failed: {err}"),
                });
                break;
            }
        }
    }

    Ok(report)
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Classify a success result against the check's expectation.
fn classify_success(check: &ToolCheck, result: &Value) -> CheckOutcome {
    let content = result.get("content").and_then(Value::as_str);

    if let Some(expected) = &check.expect_content {
        let passed = content.is_some_and(|text| text.contains(expected.as_str()));
        let detail = if passed {
            excerpt(content.unwrap_or_default())
        } else {
            format!(
                "expected content containing {expected:?}, got: {}",
                excerpt(&render_payload(result, content))
            )
        };
        return CheckOutcome {
            tool: check.tool.clone(),
            passed,
            detail,
        };
    }

    CheckOutcome {
        tool: check.tool.clone(),
        passed: true,
        detail: excerpt(&render_payload(result, content)),
    }
}

/// Prefer the textual `content` field, else the whole payload as JSON.
fn render_payload(result: &Value, content: Option<&str>) -> String {
    content.map_or_else(|| result.to_string(), ToOwned::to_owned)
}

/// Truncate display text to [`EXCERPT_CHARS`] characters.
fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        text.to_owned()
    } else {
        let mut cut: String = text.chars().take(EXCERPT_CHARS).collect();
        cut.push('…');
        cut
    }
}
