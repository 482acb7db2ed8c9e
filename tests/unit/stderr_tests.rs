//! Unit tests for the stderr drain and its suppression filter.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use mcp_probe::client::stderr::{run_drain, spawn_drain, StderrFilter};

// ── Filter ────────────────────────────────────────────────────────────────────

/// Lines containing a suppressed substring are demoted; everything else is
/// forwarded.
#[test]
fn filter_suppresses_matching_lines() {
    let filter = StderrFilter::new(vec!["INFO".to_owned()]);

    assert!(!filter.should_forward("2024-11-05T10:00:00 INFO server ready"));
    assert!(filter.should_forward("ERROR tools dir missing"));
    assert!(filter.should_forward("panicked at 'boom'"));
}

/// An empty suppression list forwards everything.
#[test]
fn empty_filter_forwards_everything() {
    let filter = StderrFilter::new(Vec::new());

    assert!(filter.should_forward("INFO noisy line"));
    assert!(filter.should_forward("anything at all"));
}

/// Multiple suppression needles each apply.
#[test]
fn multiple_needles_each_suppress() {
    let filter = StderrFilter::new(vec!["INFO".to_owned(), "DEBUG".to_owned()]);

    assert!(!filter.should_forward("DEBUG chatty"));
    assert!(!filter.should_forward("INFO chatty"));
    assert!(filter.should_forward("WARN actionable"));
}

// ── Drain task ────────────────────────────────────────────────────────────────

/// The drain consumes the stream to end-of-stream and returns — it must not
/// hang once the child closes its stderr.
#[tokio::test]
async fn drain_consumes_to_eof() {
    let (read, mut write) = tokio::io::duplex(4096);

    let writer = tokio::spawn(async move {
        write
            .write_all(b"INFO starting up\nERROR something actionable\n")
            .await
            .expect("write stderr lines");
        // Dropping the write half closes the stream.
    });

    let drained = tokio::time::timeout(
        Duration::from_secs(2),
        run_drain(
            read,
            StderrFilter::new(vec!["INFO".to_owned()]),
            CancellationToken::new(),
        ),
    )
    .await;

    assert!(drained.is_ok(), "drain must finish once the stream closes");
    writer.await.expect("writer task");
}

/// Cancellation stops the drain even while the stream is still open.
#[tokio::test]
async fn drain_stops_on_cancellation() {
    let (read, _write_kept_open) = tokio::io::duplex(4096);
    let cancel = CancellationToken::new();

    let handle = spawn_drain(read, StderrFilter::default(), cancel.clone());
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("drain must stop after cancellation")
        .expect("drain task must not panic");
}
