//! JSON-RPC 2.0 envelope types
//!
//! Provides request envelope validation, the closed error-code enumeration and
//! the mapping of internal `AppError`s onto wire error objects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::errors::AppError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Code used for structured authentication failures raised by actions.
pub const UNAUTHORIZED_CODE: i64 = -32001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl ErrorCode {
    pub const fn code(self) -> i64 {
        match self {
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// Request identifier, echoed back unchanged in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(Number),
    String(String),
}

impl RequestId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Some(Self::Number(number.clone())),
            Value::String(string) => Some(Self::String(string.clone())),
            _ => None,
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }

    pub fn invalid_request(detail: &str) -> Self {
        Self::new(
            ErrorCode::InvalidRequest,
            format!("{}: {detail}", ErrorCode::InvalidRequest.message()),
        )
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("{}: {method}", ErrorCode::MethodNotFound.message()),
        )
    }

    pub fn from_app_error(err: AppError) -> Self {
        match err {
            AppError::Rpc { code, message } => Self { code, message },
            AppError::InvalidParams { message } => Self::new(ErrorCode::InvalidParams, message),
            AppError::Unauthorized { message, .. } => Self {
                code: UNAUTHORIZED_CODE,
                message,
            },
            AppError::Internal { message } => Self::new(
                ErrorCode::InternalError,
                format!("{}: {message}", ErrorCode::InternalError.message()),
            ),
        }
    }
}

/// A request envelope that passed shape validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<Value>,
    pub id: RequestId,
}

impl RpcRequest {
    /// Validates the envelope of an arbitrary decoded value.
    ///
    /// Any failure here is reported with a `null` id, since the id of a
    /// malformed envelope is not trusted.
    pub fn from_value(payload: Value) -> Result<Self, RpcError> {
        let Value::Object(mut object) = payload else {
            return Err(RpcError::invalid_request("request must be a JSON object"));
        };

        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(RpcError::invalid_request("jsonrpc must be \"2.0\""));
        }

        let method = match object.remove("method") {
            Some(Value::String(method)) if !method.trim().is_empty() => method,
            _ => return Err(RpcError::invalid_request("method must be a non-empty string")),
        };

        let id = object
            .get("id")
            .and_then(RequestId::from_value)
            .ok_or_else(|| RpcError::invalid_request("id must be a string or number"))?;

        let params = object.remove("params").filter(|params| !params.is_null());

        Ok(Self { method, params, id })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(RpcError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub id: Option<RequestId>,
}

impl RpcResponse {
    pub fn result(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            outcome: Outcome::Result(result),
            id: Some(id),
        }
    }

    pub fn error(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            outcome: Outcome::Error(error),
            id,
        }
    }

    pub fn error_code(&self) -> Option<i64> {
        match &self.outcome {
            Outcome::Error(error) => Some(error.code),
            Outcome::Result(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("jsonrpc response serialization")
    }
}

/// Returns the object form of `params`, treating absent params as empty.
pub fn params_object(params: Option<Value>) -> Option<Map<String, Value>> {
    match params {
        None => Some(Map::new()),
        Some(Value::Object(map)) => Some(map),
        Some(_) => None,
    }
}
