use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failure raised by an action or by the HTTP layer around the dispatcher.
///
/// Every variant maps to exactly one JSON-RPC error object, see
/// [`crate::mcp::rpc::RpcError::from_app_error`].
#[derive(Debug, Error)]
pub enum AppError {
    /// Structured error whose code and message are forwarded verbatim.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid params: {message}")]
    InvalidParams { message: String },
    #[error("unauthorized: {message}")]
    Unauthorized { code: &'static str, message: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::internal(format!("upstream request timed out: {err}"));
        }
        Self::internal(format!("upstream request failed: {err}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::Unauthorized { code, message } => (StatusCode::UNAUTHORIZED, code, message),
            Self::InvalidParams { message } => (StatusCode::BAD_REQUEST, "invalid_params", message),
            Self::Rpc { message, .. } => (StatusCode::BAD_REQUEST, "rpc_error", message),
            Self::Internal { message } => {
                tracing::error!(error = %message, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}
