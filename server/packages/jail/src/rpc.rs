//! JSON-RPC call and response shapes exchanged between scripts and the node.

use jail_error::{JailError, INTERNAL_ERROR_CODE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// One script-issued request. The id is echoed back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcCall {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default, deserialize_with = "params_or_empty")]
    pub params: Vec<Value>,
}

impl RpcCall {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

fn params_or_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    /// `Some(Value::Null)` is a successful null result, `None` means an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn internal_error(id: Value, message: impl Into<String>) -> Self {
        Self::failure(id, INTERNAL_ERROR_CODE, message)
    }

    /// Maps a backend outcome for `id` onto the response shape. Structured
    /// backend errors keep their code; everything else becomes `-32603`.
    pub fn from_outcome(id: Value, outcome: Result<Value, JailError>) -> Self {
        match outcome {
            Ok(result) => Self::success(id, result),
            Err(JailError::Backend { code, message }) => Self::failure(id, code, message),
            Err(err) => Self::internal_error(id, err.to_string()),
        }
    }
}

/// A decoded request payload, remembering whether the script sent an array.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcRequest {
    Single(RpcCall),
    Batch(Vec<RpcCall>),
}

impl RpcRequest {
    /// Batch detection looks only at the first non-whitespace byte.
    pub fn decode(payload: &str) -> Result<Self, JailError> {
        let is_batch = payload.trim_start().as_bytes().first() == Some(&b'[');
        if is_batch {
            serde_json::from_str(payload)
                .map(Self::Batch)
                .map_err(|err| JailError::malformed(format!("invalid batch request: {err}")))
        } else {
            serde_json::from_str(payload)
                .map(Self::Single)
                .map_err(|err| JailError::malformed(format!("invalid request: {err}")))
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    pub fn calls(&self) -> &[RpcCall] {
        match self {
            Self::Single(call) => std::slice::from_ref(call),
            Self::Batch(calls) => calls,
        }
    }
}
