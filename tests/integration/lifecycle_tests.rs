#![cfg(unix)]
//! Integration tests for process lifecycle: spawn, terminate, bounded wait,
//! and full sessions against a real child.
//!
//! The scripted servers are `/bin/sh` one-liners speaking just enough of the
//! wire protocol for each scenario.

use std::time::Duration;

use serde_json::json;
use serial_test::serial;

use mcp_probe::client::envelope::CallOutcome;
use mcp_probe::client::session::McpSession;
use mcp_probe::client::spawner::spawn_server;
use mcp_probe::config::ProbeConfig;
use mcp_probe::AppError;

/// Shell server that completes a handshake, answers one echo call, then
/// stays alive until it is told to stop.
const ECHO_SERVER: &str = r#"read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"capabilities":{},"serverInfo":{"name":"scripted"}}}'
read line
read line
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"content":"hi"}}'
sleep 5
"#;

fn sh_config(script: &str) -> ProbeConfig {
    ProbeConfig::for_command("/bin/sh".to_owned(), vec!["-c".to_owned(), script.to_owned()])
}

// ── Spawn ─────────────────────────────────────────────────────────────────────

/// A missing executable is a `Spawn` error, fatal before any protocol work.
#[tokio::test]
#[serial]
async fn missing_executable_is_a_spawn_error() {
    let result = spawn_server("/definitely/not/a/real/binary", &[]);

    match result {
        Err(AppError::Spawn(msg)) => assert!(msg.contains("failed to spawn")),
        other => panic!("expected Err(AppError::Spawn), got: {other:?}"),
    }
}

// ── Full session ──────────────────────────────────────────────────────────────

/// Handshake, one tool call, and graceful teardown against a real child.
#[tokio::test]
#[serial]
async fn session_round_trips_over_a_real_process() {
    let config = sh_config(ECHO_SERVER);
    let mut session = McpSession::start(&config)
        .await
        .expect("session must reach ready");

    assert_eq!(session.server_info()["serverInfo"]["name"], "scripted");

    let outcome = session
        .call_tool("echo_run", &json!({"text": "hi"}))
        .await
        .expect("call must succeed");
    match outcome {
        CallOutcome::Success(payload) => assert_eq!(payload["content"], "hi"),
        CallOutcome::Remote(remote) => panic!("expected success, got: {remote:?}"),
    }

    session.shutdown().await.expect("teardown must succeed");

    // Teardown is idempotent: a second shutdown neither raises nor respawns.
    session
        .shutdown()
        .await
        .expect("second shutdown must be a no-op");
}

/// A child that exits before writing any handshake response fails the
/// session with an end-of-stream handshake error.
#[tokio::test]
#[serial]
async fn child_exit_before_response_fails_the_handshake() {
    let config = sh_config("read line; exit 0");

    let err = McpSession::start(&config)
        .await
        .expect_err("early exit must fail the handshake");

    match err {
        AppError::Handshake(msg) => assert!(
            msg.contains("end of stream"),
            "cause must be end of stream, got: {msg}"
        ),
        other => panic!("expected AppError::Handshake, got: {other:?}"),
    }
}

// ── Termination discipline ────────────────────────────────────────────────────

/// `terminate` is idempotent across repeat calls and after exit.
#[tokio::test]
#[serial]
async fn terminate_twice_is_idempotent() {
    let mut process =
        spawn_server("/bin/sh", &["-c".to_owned(), "sleep 5".to_owned()]).expect("spawn");

    process.terminate().expect("first terminate");
    process.terminate().expect("repeat terminate must be a no-op");

    process
        .wait_with_timeout(Duration::from_secs(2))
        .await
        .expect("child must exit after the stop signal");

    process
        .terminate()
        .expect("terminate after exit must be a no-op");
}

/// A child that ignores the stop signal past the bound is a `Liveness`
/// failure; the forced kill is a separate, explicit escalation.
#[tokio::test]
#[serial]
async fn ignored_stop_signal_is_a_liveness_failure() {
    let script = r"trap '' TERM; while :; do sleep 0.1; done";
    let mut process =
        spawn_server("/bin/sh", &["-c".to_owned(), script.to_owned()]).expect("spawn");

    process.terminate().expect("stop signal must be delivered");

    let err = process
        .wait_with_timeout(Duration::from_millis(300))
        .await
        .expect_err("the bound must elapse while the child ignores the signal");
    match err {
        AppError::Liveness(msg) => assert!(
            msg.contains("still running"),
            "cause must report the hung child, got: {msg}"
        ),
        other => panic!("expected AppError::Liveness, got: {other:?}"),
    }

    // Caller's discretion: escalate explicitly.
    process.force_kill().await.expect("kill must succeed");
    process
        .wait_with_timeout(Duration::from_secs(2))
        .await
        .expect("child must be gone after the kill");
}
