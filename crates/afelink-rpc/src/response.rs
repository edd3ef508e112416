use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, RpcError};

/// A validated response to one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: u64,
    /// `null` when the device sent no `result` field.
    pub result: Value,
}

/// A response frame split by outcome.
///
/// An `error` field wins even when `result` is also present. A falsy error
/// (`null`, `false`, `0`, `""`) counts as no error.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok { id: Value, result: Value },
    Err { id: Value, error: Value },
}

impl Reply {
    /// Classify a parsed frame.
    pub fn from_frame(frame: Value) -> Result<Self> {
        let Value::Object(mut fields) = frame else {
            return Err(RpcError::MalformedResponse(format!(
                "expected a JSON object, got {frame}"
            )));
        };

        let id = fields.remove("id").unwrap_or(Value::Null);
        match fields.remove("error") {
            Some(error) if is_truthy(&error) => Ok(Reply::Err { id, error }),
            _ => Ok(Reply::Ok {
                id,
                result: fields.remove("result").unwrap_or(Value::Null),
            }),
        }
    }

    pub fn id(&self) -> &Value {
        match self {
            Reply::Ok { id, .. } | Reply::Err { id, .. } => id,
        }
    }

    /// Check the reply against the request it should answer.
    ///
    /// The id is checked first, so an error reply to some other request is
    /// reported as a mismatch.
    pub fn validate(self, expected: u64) -> Result<Response> {
        if !id_matches(self.id(), expected) {
            return Err(RpcError::IdMismatch {
                expected,
                got: self.id().clone(),
            });
        }

        match self {
            Reply::Ok { result, .. } => Ok(Response {
                id: expected,
                result,
            }),
            Reply::Err { error, .. } => Err(RpcError::PeerError(error)),
        }
    }
}

/// Integral floats (`5.0`) match; strings never do.
fn id_matches(id: &Value, expected: u64) -> bool {
    match id {
        Value::Number(n) => match n.as_u64() {
            Some(v) => v == expected,
            None => n.as_f64() == Some(expected as f64),
        },
        _ => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0 && !v.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
