//! Unit tests for `Content-Length` framing and the client reader/writer
//! tasks.
//!
//! Covers:
//! - single, batched and partially delivered frames
//! - missing or oversized `Content-Length` rejected with `AppError::Protocol`
//! - reader forwards requests, skips junk, reports EOF as `ClientClosed`
//! - writer stamps monotonically increasing `seq` numbers

use std::time::Duration;

use bytes::BytesMut;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;

use aseprite_dap::dap::codec::{DapCodec, MAX_BODY_BYTES};
use aseprite_dap::dap::reader::{parse_client_frame, run_reader};
use aseprite_dap::dap::writer::{run_writer, stamp_seq};
use aseprite_dap::session::SessionInput;
use aseprite_dap::AppError;

fn frame(body: &str) -> String {
    format!("Content-Length: {}\r\n\r\n{body}", body.len())
}

// ── Decoder ───────────────────────────────────────────────────────────────────

/// A complete frame yields its body.
#[test]
fn single_frame_decodes() {
    let mut codec = DapCodec::new();
    let mut buf = BytesMut::from(frame(r#"{"seq":1}"#).as_str());

    let body = codec.decode(&mut buf).expect("decode");
    assert_eq!(body.as_deref(), Some(r#"{"seq":1}"#));
    assert!(buf.is_empty());
}

/// Two frames in one buffer decode one after the other.
#[test]
fn batched_frames_decode_in_order() {
    let mut codec = DapCodec::new();
    let raw = format!("{}{}", frame(r#"{"seq":1}"#), frame(r#"{"seq":2}"#));
    let mut buf = BytesMut::from(raw.as_str());

    assert_eq!(
        codec.decode(&mut buf).expect("first").as_deref(),
        Some(r#"{"seq":1}"#)
    );
    assert_eq!(
        codec.decode(&mut buf).expect("second").as_deref(),
        Some(r#"{"seq":2}"#)
    );
    assert_eq!(codec.decode(&mut buf).expect("third"), None);
}

/// Header and body split across reads are reassembled.
#[test]
fn partial_frame_waits_for_rest() {
    let mut codec = DapCodec::new();
    let mut buf = BytesMut::from("Content-Len");
    assert_eq!(codec.decode(&mut buf).expect("partial header"), None);

    buf.extend_from_slice(b"gth: 9\r\n\r\n{\"se");
    assert_eq!(codec.decode(&mut buf).expect("partial body"), None);

    buf.extend_from_slice(b"q\":1}");
    assert_eq!(
        codec.decode(&mut buf).expect("complete").as_deref(),
        Some(r#"{"seq":1}"#)
    );
}

/// Extra headers are tolerated.
#[test]
fn extra_headers_are_ignored() {
    let mut codec = DapCodec::new();
    let mut buf = BytesMut::from(
        "Content-Type: application/vscode-jsonrpc\r\nContent-Length: 2\r\n\r\n{}",
    );
    assert_eq!(codec.decode(&mut buf).expect("decode").as_deref(), Some("{}"));
}

/// A header block without `Content-Length` is a protocol error.
#[test]
fn missing_content_length_is_rejected() {
    let mut codec = DapCodec::new();
    let mut buf = BytesMut::from("Content-Type: x\r\n\r\n{}");
    let err = codec.decode(&mut buf).expect_err("must fail");
    assert!(matches!(err, AppError::Protocol(_)));
}

/// Bodies above the limit are refused before buffering.
#[test]
fn oversized_body_is_rejected() {
    let mut codec = DapCodec::new();
    let mut buf = BytesMut::from(format!("Content-Length: {}\r\n\r\n", MAX_BODY_BYTES + 1).as_str());
    let err = codec.decode(&mut buf).expect_err("must fail");
    assert!(err.to_string().contains("body too long"));
}

/// Encoding prepends the header with the body's byte length.
#[test]
fn encode_prepends_header() {
    let mut codec = DapCodec::new();
    let mut dst = BytesMut::new();
    codec.encode("{\"a\":\"é\"}".to_owned(), &mut dst).expect("encode");
    assert_eq!(&dst[..], "Content-Length: 10\r\n\r\n{\"a\":\"é\"}".as_bytes());
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Requests parse; responses and events from the client are ignored.
#[test]
fn parse_client_frame_accepts_requests_only() {
    let request = parse_client_frame(r#"{"type":"request","seq":1,"command":"threads"}"#)
        .expect("parse")
        .expect("request");
    assert_eq!(request.command, "threads");
    assert_eq!(request.arguments, None);

    let event = parse_client_frame(r#"{"type":"event","seq":2,"event":"x"}"#).expect("parse");
    assert!(event.is_none());

    assert!(parse_client_frame(r#"{"type":"bogus"}"#).is_err());
}

/// The reader forwards requests, skips an unparseable body and reports EOF.
#[tokio::test]
async fn reader_forwards_requests_then_reports_eof() {
    let (mut client, adapter) = tokio::io::duplex(4096);
    let (tx, mut rx) = mpsc::channel(8);
    let task = tokio::spawn(run_reader(adapter, tx, CancellationToken::new()));

    let input = format!(
        "{}{}{}",
        frame(r#"{"type":"request","seq":1,"command":"initialize","arguments":{"adapterID":"x"}}"#),
        frame("not json"),
        frame(r#"{"type":"request","seq":2,"command":"threads"}"#),
    );
    client.write_all(input.as_bytes()).await.expect("write");
    drop(client);

    let first = rx.recv().await.expect("first");
    let SessionInput::ClientRequest(first) = first else {
        panic!("expected request, got {first:?}");
    };
    assert_eq!(first.command, "initialize");
    assert_eq!(first.arguments, Some(json!({"adapterID": "x"})));

    let second = rx.recv().await.expect("second");
    assert!(matches!(second, SessionInput::ClientRequest(ref r) if r.seq == 2));

    let closed = rx.recv().await.expect("closed");
    assert!(matches!(closed, SessionInput::ClientClosed));

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("reader exits")
        .expect("join");
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// `stamp_seq` overwrites the runtime's numbering.
#[test]
fn stamp_seq_overwrites_existing_seq() {
    let mut message = json!({"type": "event", "seq": 99, "event": "output"});
    stamp_seq(&mut message, 3);
    assert_eq!(message["seq"], 3);
}

/// The writer frames messages with seq 1, 2, ... and stops when the queue
/// closes.
#[tokio::test]
async fn writer_frames_messages_with_increasing_seq() {
    let (adapter, mut client) = tokio::io::duplex(4096);
    let (tx, rx) = mpsc::channel(8);
    let task = tokio::spawn(run_writer(adapter, rx, CancellationToken::new()));

    tx.send(json!({"type": "event", "seq": 0, "event": "initialized"}))
        .await
        .expect("send");
    tx.send(json!({"type": "event", "seq": 42, "event": "output"}))
        .await
        .expect("send");
    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("writer exits")
        .expect("join")
        .expect("writer ok");

    let mut raw = Vec::new();
    client.read_to_end(&mut raw).await.expect("read");

    let mut codec = DapCodec::new();
    let mut buf = BytesMut::from(&raw[..]);
    let first: serde_json::Value =
        serde_json::from_str(&codec.decode(&mut buf).expect("decode").expect("first"))
            .expect("json");
    let second: serde_json::Value =
        serde_json::from_str(&codec.decode(&mut buf).expect("decode").expect("second"))
            .expect("json");

    assert_eq!(first["seq"], 1);
    assert_eq!(first["event"], "initialized");
    assert_eq!(second["seq"], 2);
}
