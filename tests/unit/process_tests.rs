//! Unit tests for runtime output pumping and launch failures.

use std::path::Path;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use aseprite_dap::runtime::process::{pump_lines, spawn_runtime, OutputStream, RuntimeHandle};
use aseprite_dap::session::SessionInput;
use aseprite_dap::AppError;

/// Each line is forwarded without its terminator, CRLF included, and a
/// final unterminated line is not lost.
#[tokio::test]
async fn lines_are_forwarded_without_terminators() {
    let (tx, mut rx) = mpsc::channel(8);
    let output: &[u8] = b"first\r\nsecond\nthird";

    pump_lines(output, OutputStream::Stderr, tx).await;

    let mut lines = Vec::new();
    while let Ok(input) = rx.try_recv() {
        let SessionInput::RuntimeOutput { stream, line } = input else {
            panic!("unexpected input {input:?}");
        };
        assert_eq!(stream, OutputStream::Stderr);
        lines.push(line);
    }
    assert_eq!(lines, ["first", "second", "third"]);
}

/// Invalid UTF-8 is replaced rather than dropping the line.
#[tokio::test]
async fn invalid_utf8_is_replaced() {
    let (tx, mut rx) = mpsc::channel(8);
    let output: &[u8] = b"bad \xff byte\n";

    pump_lines(output, OutputStream::Stdout, tx).await;

    let input = rx.try_recv().expect("line");
    let SessionInput::RuntimeOutput { line, .. } = input else {
        panic!("unexpected input {input:?}");
    };
    assert_eq!(line, "bad \u{fffd} byte");
}

/// Streams map to their output event categories.
#[test]
fn stream_categories() {
    assert_eq!(OutputStream::Stdout.category(), "stdout");
    assert_eq!(OutputStream::Stderr.category(), "stderr");
}

/// Launching a missing executable is a spawn error.
#[tokio::test]
async fn missing_executable_is_spawn_error() {
    let (tx, _rx) = mpsc::channel(8);
    let err = spawn_runtime(Path::new("/definitely/not/aseprite"), tx).expect_err("must fail");
    assert!(matches!(err, AppError::Spawn(_)));
}

/// Killing a handle is idempotent and observable.
#[test]
fn kill_is_idempotent() {
    let handle = RuntimeHandle::new(CancellationToken::new(), Some(7));
    assert_eq!(handle.pid(), Some(7));
    assert!(!handle.is_killed());
    handle.kill();
    handle.kill();
    assert!(handle.is_killed());
}
