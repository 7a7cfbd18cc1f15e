//! Unit tests for host-call correlation.

use rstest::rstest;
use serde_json::json;

use super::*;

#[test]
fn first_ping_emits_bootstrap_call() {
    let mut bridge = HostCallBridge::new();
    let frame = bridge.on_ping(Some(&json!(1)), 99).expect("bootstrap call");
    assert_eq!(frame, Message::RustCall {
        id: json!("ts-rust-1"),
        payload: json!({ "op": "uppercase", "text": "hello from ts (seq=1)" }),
    });
    assert!(bridge.bootstrap_sent());
    assert!(bridge.is_pending("ts-rust-1"));
}

#[test]
fn bootstrap_call_is_emitted_once() {
    let mut bridge = HostCallBridge::new();
    assert!(bridge.on_ping(Some(&json!(1)), 0).is_some());
    assert!(bridge.on_ping(Some(&json!(2)), 0).is_none());
    assert!(bridge.on_ping(None, 0).is_none());
    assert_eq!(bridge.pending_len(), 1);
}

#[test]
fn missing_seq_uses_timestamp_and_placeholder() {
    let mut bridge = HostCallBridge::new();
    let frame = bridge.on_ping(None, 1_700_000_000_000).expect("bootstrap call");
    assert_eq!(frame, Message::RustCall {
        id: json!("ts-rust-1700000000000"),
        payload: json!({ "op": "uppercase", "text": "hello from ts (seq=n/a)" }),
    });
}

#[test]
fn string_seq_is_interpolated_without_quotes() {
    let mut bridge = HostCallBridge::new();
    let frame = bridge.on_ping(Some(&json!("abc")), 0).expect("bootstrap call");
    let Message::RustCall { id, .. } = frame else {
        panic!("expected rust_call, got {frame:?}");
    };
    assert_eq!(id, json!("ts-rust-abc"));
}

#[rstest]
#[case::result(HostCallReply::Result { id: json!("c1"), result: json!("OK") })]
#[case::error(HostCallReply::Error { id: json!("c1"), error: String::from("nope") })]
fn replies_resolve_pending_calls(#[case] reply: HostCallReply) {
    let mut bridge = HostCallBridge::new();
    bridge.call("c1", json!({ "op": "echo" }));
    assert!(bridge.resolve(&reply));
    assert_eq!(bridge.pending_len(), 0);
    assert!(!bridge.resolve(&reply), "second reply is unknown");
}

#[test]
fn unknown_reply_is_reported() {
    let mut bridge = HostCallBridge::new();
    let reply = HostCallReply::Result {
        id: json!(7),
        result: json!(null),
    };
    assert!(!bridge.resolve(&reply));
}
