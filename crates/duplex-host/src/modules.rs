//! Built-in script modules served by the host's module registry.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tracing::info;

use duplex_bridge::{
    Delivery, DeliveryKind, GlobalScope, HandlerContext, HandlerError, HostCallReply,
    HostResultHandler, LoaderError, MessageHandler, MfaUpdate, MfaUpdateHandler, ModuleExports,
    ModuleRegistry, RequestHandler, ScriptModule,
};

const MODULES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::modules");

/// Echoes every request; logs host-call replies and mfa updates.
pub const ECHO: &str = "builtin:echo";
/// Installs a global handler that uppercases string payloads.
pub const UPPER: &str = "builtin:upper";
/// Installs a generic request handler.
pub const REQUEST_GLOBALS: &str = "builtin:request-globals";
/// Forwards each request to the host as a `rust_call`.
pub const RELAY: &str = "builtin:relay";
/// Fails every request fatally.
pub const FATAL: &str = "builtin:fatal";

/// Builds a registry holding every built-in module.
///
/// # Errors
///
/// Returns [`LoaderError::DuplicateModule`] if two built-ins share a name.
pub fn builtin_registry() -> Result<ModuleRegistry, LoaderError> {
    let mut registry = ModuleRegistry::new();
    registry.register(ECHO, EchoTarget)?;
    registry.register(UPPER, UpperGlobals)?;
    registry.register(REQUEST_GLOBALS, RequestGlobals)?;
    registry.register(RELAY, RelayTarget)?;
    registry.register(FATAL, FatalTarget)?;
    Ok(registry)
}

fn source_label(kind: DeliveryKind) -> &'static str {
    match kind {
        DeliveryKind::Message => "message",
        DeliveryKind::External => "external_message",
    }
}

// ---------------------------------------------------------------------------
// builtin:echo
// ---------------------------------------------------------------------------

struct EchoTarget;

struct Echo;

impl MessageHandler for Echo {
    fn handle(
        &self,
        delivery: &Delivery<'_>,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<Value, HandlerError> {
        Ok(json!({
            "echo": delivery.payload,
            "source": source_label(delivery.kind),
        }))
    }
}

struct LogReplies;

impl HostResultHandler for LogReplies {
    fn handle(
        &self,
        reply: &HostCallReply,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<(), HandlerError> {
        match reply {
            HostCallReply::Result { id, result } => {
                info!(target: MODULES_TARGET, id = %id, result = %result, "host call completed");
            }
            HostCallReply::Error { id, error } => {
                info!(target: MODULES_TARGET, id = %id, error = %error, "host call rejected");
            }
        }
        Ok(())
    }
}

struct LogMfa;

impl MfaUpdateHandler for LogMfa {
    fn handle(&self, update: &MfaUpdate, _ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
        info!(
            target: MODULES_TARGET,
            added = update.added.len(),
            total = update.mfa.len(),
            "mfa list updated"
        );
        Ok(())
    }
}

impl ScriptModule for EchoTarget {
    fn exports(&self) -> ModuleExports {
        ModuleExports::none()
            .with_message(Echo)
            .with_host_result(LogReplies)
            .with_mfa_update(LogMfa)
    }
}

// ---------------------------------------------------------------------------
// builtin:upper
// ---------------------------------------------------------------------------

struct UpperGlobals;

struct Upper;

impl MessageHandler for Upper {
    fn handle(
        &self,
        delivery: &Delivery<'_>,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<Value, HandlerError> {
        delivery
            .payload
            .as_str()
            .map(|text| Value::String(text.to_uppercase()))
            .ok_or_else(|| HandlerError::failed("builtin:upper expects a string payload"))
    }
}

impl ScriptModule for UpperGlobals {
    fn install(&self, globals: &mut GlobalScope) {
        globals.set_message_handler(Upper);
    }
}

// ---------------------------------------------------------------------------
// builtin:request-globals
// ---------------------------------------------------------------------------

struct RequestGlobals;

struct DescribeRequest;

impl RequestHandler for DescribeRequest {
    fn handle(&self, request: &str, ctx: &mut HandlerContext<'_>) -> Result<Value, HandlerError> {
        Ok(json!({
            "request": request,
            "target": ctx.state().target_specifier(),
        }))
    }
}

impl ScriptModule for RequestGlobals {
    fn install(&self, globals: &mut GlobalScope) {
        globals.set_request_handler(DescribeRequest);
    }
}

// ---------------------------------------------------------------------------
// builtin:relay
// ---------------------------------------------------------------------------

struct RelayTarget;

#[derive(Default)]
struct Relay {
    next: AtomicU64,
}

impl MessageHandler for Relay {
    fn handle(
        &self,
        delivery: &Delivery<'_>,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Value, HandlerError> {
        let id = format!("relay-{}", self.next.fetch_add(1, Ordering::Relaxed));
        ctx.call_host(id.clone(), delivery.payload.clone());
        Ok(json!({ "relayed": id }))
    }
}

impl ScriptModule for RelayTarget {
    fn exports(&self) -> ModuleExports {
        ModuleExports::none()
            .with_message(Relay::default())
            .with_host_result(LogReplies)
    }
}

// ---------------------------------------------------------------------------
// builtin:fatal
// ---------------------------------------------------------------------------

struct FatalTarget;

struct AlwaysFatal;

impl MessageHandler for AlwaysFatal {
    fn handle(
        &self,
        _delivery: &Delivery<'_>,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<Value, HandlerError> {
        Err(HandlerError::fatal("builtin:fatal refuses every request"))
    }
}

impl ScriptModule for FatalTarget {
    fn exports(&self) -> ModuleExports {
        ModuleExports::none().with_message(AlwaysFatal)
    }
}
