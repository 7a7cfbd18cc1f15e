//! Privileged operations the host performs on behalf of the script side.

use serde_json::{Value, json};
use thiserror::Error;

/// Operation used when a `rust_call` payload names none.
pub const DEFAULT_OP: &str = "echo";

/// Executes the payload of a `rust_call` frame.
pub trait HostCallExecutor: Send + Sync {
    /// Runs the operation named by `payload` and returns its result.
    ///
    /// # Errors
    ///
    /// Returns a [`HostCallError`] when the operation is unknown or its
    /// arguments are malformed.
    fn execute(&self, payload: &Value) -> Result<Value, HostCallError>;
}

/// Failures of a host operation, reported back as `rust_call_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostCallError {
    /// The payload named an operation the host does not offer.
    #[error("unsupported rust_call op: {op}")]
    Unsupported {
        /// Requested operation.
        op: String,
    },
    /// A required field was missing or had the wrong type.
    #[error("rust_call.{op} requires {expected}")]
    InvalidArgument {
        /// Operation being executed.
        op: &'static str,
        /// Description of the expected field.
        expected: &'static str,
    },
    /// A list field held something other than numbers.
    #[error("rust_call.{op} expects numbers only")]
    NonNumeric {
        /// Operation being executed.
        op: &'static str,
    },
}

/// The built-in operation set: `uppercase`, `sum` and `echo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostOps;

impl HostOps {
    /// Creates the built-in operation set.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HostCallExecutor for HostOps {
    fn execute(&self, payload: &Value) -> Result<Value, HostCallError> {
        let op = payload.get("op").and_then(Value::as_str).unwrap_or(DEFAULT_OP);
        match op {
            "uppercase" => uppercase(payload),
            "sum" => sum(payload),
            "echo" => Ok(json!({ "op": "echo", "output": payload })),
            other => Err(HostCallError::Unsupported {
                op: other.to_owned(),
            }),
        }
    }
}

fn uppercase(payload: &Value) -> Result<Value, HostCallError> {
    let text = payload
        .get("text")
        .and_then(Value::as_str)
        .ok_or(HostCallError::InvalidArgument {
            op: "uppercase",
            expected: "string field `text`",
        })?;
    Ok(json!({ "op": "uppercase", "output": text.to_uppercase() }))
}

fn sum(payload: &Value) -> Result<Value, HostCallError> {
    let values = payload
        .get("values")
        .and_then(Value::as_array)
        .ok_or(HostCallError::InvalidArgument {
            op: "sum",
            expected: "array field `values`",
        })?;
    let numbers = values
        .iter()
        .map(|value| {
            value
                .as_f64()
                .ok_or(HostCallError::NonNumeric { op: "sum" })
        })
        .collect::<Result<Vec<f64>, _>>()?;
    let total: f64 = numbers.into_iter().sum();
    Ok(json!({ "op": "sum", "output": total }))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;

    #[rstest]
    #[case::uppercase(
        json!({ "op": "uppercase", "text": "hello" }),
        json!({ "op": "uppercase", "output": "HELLO" })
    )]
    #[case::sum(
        json!({ "op": "sum", "values": [1, 2.5, -0.5] }),
        json!({ "op": "sum", "output": 3.0 })
    )]
    #[case::empty_sum(
        json!({ "op": "sum", "values": [] }),
        json!({ "op": "sum", "output": 0.0 })
    )]
    #[case::explicit_echo(
        json!({ "op": "echo", "x": 1 }),
        json!({ "op": "echo", "output": { "op": "echo", "x": 1 } })
    )]
    #[case::echo_by_default(
        json!({ "x": 1 }),
        json!({ "op": "echo", "output": { "x": 1 } })
    )]
    fn built_in_operations(#[case] payload: Value, #[case] expected: Value) {
        assert_eq!(HostOps::new().execute(&payload).expect("op succeeds"), expected);
    }

    #[rstest]
    #[case::missing_text(json!({ "op": "uppercase" }), "rust_call.uppercase requires string field `text`")]
    #[case::non_array(json!({ "op": "sum", "values": 3 }), "rust_call.sum requires array field `values`")]
    #[case::non_number(json!({ "op": "sum", "values": [1, "2"] }), "rust_call.sum expects numbers only")]
    #[case::null_entry(json!({ "op": "sum", "values": [null] }), "rust_call.sum expects numbers only")]
    #[case::unknown(json!({ "op": "delete_everything" }), "unsupported rust_call op: delete_everything")]
    fn failures_carry_readable_messages(#[case] payload: Value, #[case] message: &str) {
        let error = HostOps::new().execute(&payload).expect_err("op fails");
        assert_eq!(error.to_string(), message);
    }

    #[test]
    fn non_object_payload_is_echoed() {
        let result = HostOps::new().execute(&json!("plain")).expect("echo");
        assert_eq!(result, json!({ "op": "echo", "output": "plain" }));
    }
}
