use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// JSON-RPC code used for every failure that is not a structured backend error.
pub const INTERNAL_ERROR_CODE: i64 = -32603;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    NotInitialized,
    CellNotFound,
    NodeUnavailable,
    Busy,
    MalformedRequest,
    BackendError,
    InternalError,
}

impl ErrorType {
    pub fn as_urn(&self) -> &'static str {
        match self {
            Self::NotInitialized => "urn:jail:error:not_initialized",
            Self::CellNotFound => "urn:jail:error:cell_not_found",
            Self::NodeUnavailable => "urn:jail:error:node_unavailable",
            Self::Busy => "urn:jail:error:busy",
            Self::MalformedRequest => "urn:jail:error:malformed_request",
            Self::BackendError => "urn:jail:error:backend_error",
            Self::InternalError => "urn:jail:error:internal_error",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::NotInitialized => "Not Initialized",
            Self::CellNotFound => "Cell Not Found",
            Self::NodeUnavailable => "Node Unavailable",
            Self::Busy => "Busy",
            Self::MalformedRequest => "Malformed Request",
            Self::BackendError => "Backend Error",
            Self::InternalError => "Internal Error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotInitialized => 503,
            Self::CellNotFound => 404,
            Self::NodeUnavailable => 503,
            Self::Busy => 429,
            Self::MalformedRequest => 400,
            Self::BackendError => 502,
            Self::InternalError => 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl ProblemDetails {
    pub fn new(error_type: ErrorType, detail: Option<String>) -> Self {
        Self {
            type_: error_type.as_urn().to_string(),
            title: error_type.title().to_string(),
            status: error_type.status_code(),
            detail,
            instance: None,
            extensions: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JailError {
    #[error("jail environment is not properly initialized")]
    NotInitialized,
    #[error("Cell[{cell_id}] doesn't exist.")]
    CellNotFound { cell_id: String },
    #[error("no running node is available")]
    NodeUnavailable,
    #[error("cell {cell_id} is busy: gate not acquired within {waited_ms}ms")]
    Busy { cell_id: String, waited_ms: u64 },
    #[error("malformed request: {message}")]
    MalformedRequest { message: String },
    #[error("{message}")]
    Backend { code: i64, message: String },
    #[error("{message}")]
    Internal { message: String },
}

impl JailError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::NotInitialized => ErrorType::NotInitialized,
            Self::CellNotFound { .. } => ErrorType::CellNotFound,
            Self::NodeUnavailable => ErrorType::NodeUnavailable,
            Self::Busy { .. } => ErrorType::Busy,
            Self::MalformedRequest { .. } => ErrorType::MalformedRequest,
            Self::Backend { .. } => ErrorType::BackendError,
            Self::Internal { .. } => ErrorType::InternalError,
        }
    }

    /// Code reported in a JSON-RPC `error` object for this failure.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::Backend { code, .. } => *code,
            _ => INTERNAL_ERROR_CODE,
        }
    }

    pub fn to_problem_details(&self) -> ProblemDetails {
        let mut problem = ProblemDetails::new(self.error_type(), Some(self.to_string()));

        let mut extensions = Map::new();
        match self {
            Self::CellNotFound { cell_id } => {
                extensions.insert("cellId".to_string(), Value::String(cell_id.clone()));
            }
            Self::Busy { cell_id, waited_ms } => {
                extensions.insert("cellId".to_string(), Value::String(cell_id.clone()));
                extensions.insert("waitedMs".to_string(), Value::from(*waited_ms));
            }
            Self::Backend { code, .. } => {
                extensions.insert("code".to_string(), Value::from(*code));
            }
            Self::NotInitialized
            | Self::NodeUnavailable
            | Self::MalformedRequest { .. }
            | Self::Internal { .. } => {}
        }
        problem.extensions = extensions;
        problem
    }
}

impl From<JailError> for ProblemDetails {
    fn from(value: JailError) -> Self {
        value.to_problem_details()
    }
}

impl From<&JailError> for ProblemDetails {
    fn from(value: &JailError) -> Self {
        value.to_problem_details()
    }
}

/// Uniform `{"result": ...}` / `{"error": "..."}` wrapper returned by every
/// public string entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Result { result: Value },
    Error { error: String },
}

impl Envelope {
    pub fn from_result(result: Result<Value, JailError>) -> Self {
        match result {
            Ok(result) => Self::Result { result },
            Err(err) => Self::from(&err),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn to_json_string(&self) -> String {
        // Both variants hold plain JSON data, so serialization cannot fail.
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"envelope encoding failed"}"#.to_string())
    }
}

impl From<&JailError> for Envelope {
    fn from(value: &JailError) -> Self {
        Self::Error {
            error: value.to_string(),
        }
    }
}

impl From<JailError> for Envelope {
    fn from(value: JailError) -> Self {
        Self::from(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_shapes_match_wire_format() {
        let ok = Envelope::from_result(Ok(json!("pong")));
        assert_eq!(ok.to_json_string(), r#"{"result":"pong"}"#);

        let null = Envelope::from_result(Ok(Value::Null));
        assert_eq!(null.to_json_string(), r#"{"result":null}"#);

        let err = Envelope::from_result(Err(JailError::CellNotFound {
            cell_id: "chat-1".to_string(),
        }));
        assert!(err.is_error());
        assert_eq!(
            err.to_json_string(),
            r#"{"error":"Cell[chat-1] doesn't exist."}"#
        );
    }

    #[test]
    fn envelope_parses_back_into_variants() {
        let parsed: Envelope = serde_json::from_str(r#"{"error":"boom"}"#).expect("parse error");
        assert_eq!(
            parsed,
            Envelope::Error {
                error: "boom".to_string()
            }
        );

        let parsed: Envelope = serde_json::from_str(r#"{"result":{"a":1}}"#).expect("parse result");
        assert_eq!(parsed, Envelope::Result { result: json!({"a": 1}) });
    }

    #[test]
    fn rpc_code_passes_backend_codes_through() {
        let backend = JailError::Backend {
            code: -32601,
            message: "method not found".to_string(),
        };
        assert_eq!(backend.rpc_code(), -32601);
        assert_eq!(backend.to_string(), "method not found");
        assert_eq!(JailError::NodeUnavailable.rpc_code(), INTERNAL_ERROR_CODE);
        assert_eq!(JailError::internal("x").rpc_code(), INTERNAL_ERROR_CODE);
    }

    #[test]
    fn problem_details_carry_type_and_extensions() {
        let problem = JailError::Busy {
            cell_id: "c".to_string(),
            waited_ms: 50,
        }
        .to_problem_details();
        assert_eq!(problem.type_, "urn:jail:error:busy");
        assert_eq!(problem.status, 429);
        assert_eq!(problem.extensions["cellId"], json!("c"));
        assert_eq!(problem.extensions["waitedMs"], json!(50));

        let encoded = serde_json::to_value(&problem).expect("encode problem");
        assert_eq!(encoded["title"], json!("Busy"));
        assert_eq!(encoded["waitedMs"], json!(50));
    }
}
