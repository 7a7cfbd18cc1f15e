//! Crate-level session tests and BDD scenarios.

use std::sync::Arc;
use std::thread;

use serde_json::{Value, json};

use crate::channel::{ChannelSlot, DuplexTransport, MemoryTransport, memory_pair};
use crate::error::{HandlerError, SessionError};
use crate::handlers::{
    Delivery, GlobalScope, HandlerContext, MessageHandler, ModuleExports, RequestHandler,
    ScriptModule,
};
use crate::loader::{ModuleLoader, ModuleRegistry};
use crate::pump::{Session, SessionOptions, SessionReport};
use crate::session::SessionSeed;


/// Target whose message handler fails on `"boom"`, is fatal on `"FATAL"`
/// and echoes anything else.
struct ScriptedTarget;

struct Scripted;

impl MessageHandler for Scripted {
    fn handle(
        &self,
        delivery: &Delivery<'_>,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<Value, HandlerError> {
        match delivery.payload.as_str() {
            Some("boom") => Err(HandlerError::failed("boom")),
            Some("FATAL") => Err(HandlerError::fatal("FATAL")),
            _ => Ok(json!({ "echo": delivery.payload })),
        }
    }
}

impl ScriptModule for ScriptedTarget {
    fn exports(&self) -> ModuleExports {
        ModuleExports::none().with_message(Scripted)
    }
}

struct Plain;

impl ScriptModule for Plain {}

struct Shout;

impl RequestHandler for Shout {
    fn handle(&self, request: &str, _ctx: &mut HandlerContext<'_>) -> Result<Value, HandlerError> {
        Ok(Value::String(request.to_uppercase()))
    }
}

struct ShoutGlobals;

impl ScriptModule for ShoutGlobals {
    fn install(&self, globals: &mut GlobalScope) {
        globals.set_request_handler(Shout);
    }
}

fn test_loader() -> ModuleLoader {
    let mut registry = ModuleRegistry::new();
    registry
        .register("builtin:scripted", ScriptedTarget)
        .expect("scripted");
    registry.register("builtin:plain", Plain).expect("plain");
    registry
        .register("builtin:shout", ShoutGlobals)
        .expect("shout");
    ModuleLoader::new(Arc::new(registry))
}

type SessionThread = thread::JoinHandle<Result<SessionReport, SessionError>>;

fn spawn_session(seed: &SessionSeed) -> (SessionThread, MemoryTransport) {
    let (script, host) = memory_pair();
    let slot = ChannelSlot::with_transport(script);
    let session = Session::bootstrap(
        seed,
        test_loader(),
        &slot,
        SessionOptions::new().with_clock(|| 7),
    )
    .expect("bootstrap");
    (thread::spawn(move || session.run()), host)
}

/// Sends every line, then collects everything written until the session
/// closes its end.
fn converse(seed: &SessionSeed, lines: &[&str]) -> (Vec<Value>, Result<SessionReport, SessionError>) {
    let (session, mut host) = spawn_session(seed);
    for line in lines {
        host.send_line(line).expect("send");
    }
    let outcome = session.join().expect("session thread");
    let mut frames = Vec::new();
    while let Ok(line) = host.recv_line(None) {
        frames.push(serde_json::from_str(&line).expect("json frame"));
    }
    (frames, outcome)
}

fn kinds(frames: &[Value]) -> Vec<&str> {
    frames
        .iter()
        .map(|frame| frame["type"].as_str().unwrap_or("?"))
        .collect()
}

#[test]
fn session_survives_every_recoverable_failure() {
    let seed = SessionSeed::new("builtin:scripted").with_mfa(vec![String::from("m0")]);
    let (frames, outcome) = converse(&seed, &[
        "garbage",
        r#"{"type":"nope"}"#,
        r#"{"type":"message","id":"m1","payload":"boom"}"#,
        r#"{"type":"module","id":"x","specifier":"builtin:missing"}"#,
        r#"{"type":"runtime_args","id":"r"}"#,
        r#"{"type":"ping","seq":2}"#,
        r#"{"type":"shutdown","reason":"done"}"#,
    ]);

    assert_eq!(kinds(&frames), [
        "ready",
        "unknown",
        "unknown",
        "error",
        "module_error",
        "error",
        "pong",
        "rust_call",
        "shutdown_ack",
    ]);
    assert_eq!(frames[3], json!({ "type": "error", "id": "m1", "error": "boom" }));
    let report = outcome.expect("clean stop");
    assert_eq!(report.shutdown_reason, "done");
    assert_eq!(report.state.mfa, ["m0"]);
}

#[test]
fn request_handler_from_live_module_takes_effect() {
    let seed = SessionSeed::new("builtin:plain");
    let (frames, outcome) = converse(&seed, &[
        r#"{"type":"message","id":1,"payload":"before"}"#,
        r#"{"type":"module","id":2,"specifier":"builtin:shout"}"#,
        r#"{"type":"message","id":3,"payload":"after"}"#,
        r#"{"type":"shutdown"}"#,
    ]);

    assert_eq!(frames[1], json!({ "type": "message_result", "id": 1, "result": null }));
    assert_eq!(
        frames[2],
        json!({
            "type": "module_loaded",
            "id": 2,
            "specifier": "builtin:shout",
            "modules": ["builtin:shout"],
        })
    );
    assert_eq!(frames[3], json!({ "type": "message_result", "id": 3, "result": "AFTER" }));
    assert!(outcome.is_ok());
}
