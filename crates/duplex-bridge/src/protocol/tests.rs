//! Unit tests for the line framing.

use rstest::rstest;
use serde_json::{Value, json};

use super::*;

// ---------------------------------------------------------------------------
// decode: degradation paths
// ---------------------------------------------------------------------------

#[test]
fn non_json_line_becomes_text() {
    assert_eq!(
        decode("hello there\n"),
        Message::Text {
            raw: String::from("hello there"),
        }
    );
}

#[rstest]
#[case::missing_type(r#"{"seq":1}"#, Value::Null)]
#[case::numeric_type(r#"{"type":7}"#, json!(7))]
#[case::unknown_kind(r#"{"type":"foo"}"#, json!("foo"))]
#[case::array(r"[1,2,3]", Value::Null)]
#[case::scalar("42", Value::Null)]
fn unrecognised_json_becomes_unknown(#[case] line: &str, #[case] expected: Value) {
    assert_eq!(decode(line), Message::unknown(expected));
}

#[test]
fn malformed_known_kind_keeps_its_type() {
    let decoded = decode(r#"{"type":"pong","seq":1}"#);
    assert_eq!(decoded, Message::unknown(json!("pong")));
}

#[test]
fn json_tagged_text_is_not_trusted() {
    let decoded = decode(r#"{"type":"text","raw":"x"}"#);
    assert_eq!(decoded, Message::unknown(json!("text")));
}

#[test]
fn carriage_return_is_stripped() {
    assert_eq!(decode("{\"type\":\"ping\",\"seq\":3}\r\n"), Message::Ping {
        seq: Some(json!(3)),
    });
}

// ---------------------------------------------------------------------------
// decode: requests with optional fields
// ---------------------------------------------------------------------------

#[test]
fn ping_without_seq_decodes() {
    assert_eq!(decode(r#"{"type":"ping"}"#), Message::Ping { seq: None });
}

#[test]
fn message_without_id_or_payload_decodes() {
    assert_eq!(decode(r#"{"type":"message"}"#), Message::Message {
        id: None,
        payload: Value::Null,
    });
}

#[test]
fn module_keeps_non_string_specifier_for_validation() {
    assert_eq!(
        decode(r#"{"type":"module","id":"m","specifier":5}"#),
        Message::Module {
            id: Some(json!("m")),
            specifier: Some(json!(5)),
        }
    );
}

#[test]
fn rust_call_error_without_message_still_decodes() {
    assert_eq!(
        decode(r#"{"type":"rust_call_error","id":"c1"}"#),
        Message::RustCallError {
            id: json!("c1"),
            error: None,
        }
    );
}

#[rstest]
#[case::numeric_reason(r#"{"type":"shutdown","reason":42}"#, "shutdown")]
#[case::object_error(r#"{"type":"rust_call_error","id":"x","error":{"code":1}}"#, "rust_call_error")]
fn loosely_typed_control_fields_keep_their_frame_kind(#[case] line: &str, #[case] kind: &str) {
    assert_eq!(decode(line).kind(), kind);
}

#[rstest]
#[case::absent(None, "fallback")]
#[case::null(Some(json!(null)), "fallback")]
#[case::string(Some(json!("bye")), "bye")]
#[case::number(Some(json!(42)), "42")]
#[case::object(Some(json!({ "code": 1 })), r#"{"code":1}"#)]
fn free_form_fields_render_as_text(#[case] value: Option<Value>, #[case] expected: &str) {
    assert_eq!(render_text(value.as_ref(), "fallback"), expected);
}

// ---------------------------------------------------------------------------
// encode: wire shape
// ---------------------------------------------------------------------------

#[test]
fn ready_uses_camel_case_keys() {
    let line = encode(&Message::Ready {
        target_specifier: String::from("builtin:echo"),
        has_exported_handler: true,
        has_global_handler: false,
        has_rust_result_handler: false,
        has_mfa_update_handler: true,
        modules: vec![String::from("builtin:upper")],
        mfa: vec![],
        args: vec![String::from("--flag")],
    })
    .expect("encode ready");
    let value: Value = serde_json::from_str(&line).expect("valid json");
    assert_eq!(value["type"], "ready");
    assert_eq!(value["targetSpecifier"], "builtin:echo");
    assert_eq!(value["hasExportedHandler"], true);
    assert_eq!(value["hasMfaUpdateHandler"], true);
    assert_eq!(value["args"], json!(["--flag"]));
}

#[test]
fn unknown_uses_received_type_key() {
    let line = encode(&Message::unknown(json!("foo"))).expect("encode unknown");
    assert_eq!(line, r#"{"type":"unknown","receivedType":"foo"}"#);
}

#[test]
fn absent_id_is_written_as_null() {
    let line = encode(&Message::MessageResult {
        id: None,
        result: json!(1),
    })
    .expect("encode result");
    assert_eq!(line, r#"{"type":"message_result","id":null,"result":1}"#);
}

#[test]
fn module_error_omits_missing_specifier() {
    let line = encode(&Message::ModuleError {
        id: Some(json!("m1")),
        specifier: None,
        error: String::from("module specifier must be a non-empty string"),
    })
    .expect("encode module error");
    let value: Value = serde_json::from_str(&line).expect("valid json");
    assert!(value.get("specifier").is_none());
    assert_eq!(value["id"], "m1");
}

#[test]
fn encoded_frames_are_single_lines() {
    let line = encode(&Message::Error {
        id: Some(json!("x")),
        error: String::from("line one\nline two"),
    })
    .expect("encode error");
    assert!(!line.contains('\n'));
}

#[rstest]
#[case(Message::shutdown("bye"), "shutdown")]
#[case(Message::ShutdownAck { reason: String::from("bye") }, "shutdown_ack")]
#[case(Message::RuntimeArgsUpdated { id: None, args: vec![] }, "runtime_args_updated")]
#[case(Message::Pong { seq: Value::Null, at: 0 }, "pong")]
fn kind_matches_the_wire_tag(#[case] message: Message, #[case] expected: &str) {
    assert_eq!(message.kind(), expected);
    let line = encode(&message).expect("encode");
    let value: Value = serde_json::from_str(&line).expect("valid json");
    assert_eq!(value["type"], expected);
}
