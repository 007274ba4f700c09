//! Error types for webrpc.
//!
//! `RpcError` covers everything a caller of the client, server or injector can
//! observe locally. `ApiError` is what an API implementation returns when a
//! dispatched call fails; it is serialized onto the wire as an error object.

use crate::protocol::{codes, ErrorObject};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Main error type for webrpc operations.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    // Client connection state
    #[error("Already connected.")]
    AlreadyConnected,

    #[error("RPC client not connected.")]
    NotConnected,

    #[error("RPC client closed.")]
    ClientClosed,

    #[error("RPC call timed out after {0:?}.")]
    Timeout(Duration),

    // Server state
    #[error("Already listening.")]
    AlreadyListening,

    // API registry and injector
    #[error("API name must be a non-empty string.")]
    InvalidApiName,

    #[error("The \"{name}\" API is already defined.")]
    ApiAlreadyDefined { name: String },

    #[error("API \"{name}\" has not been defined.")]
    ApiNotDefined { name: String },

    #[error("Function \"{function}\" is not defined on API \"{api}\".")]
    FunctionNotDefined { api: String, function: String },

    // Transport
    #[error("Invalid origin {url}: {message}")]
    InvalidOrigin { url: String, message: String },

    #[error("Target window handle is unavailable")]
    HandleUnavailable,

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("JSON error: {message}")]
    Json { message: String },

    /// Failure reported by the remote side in a response `error` member.
    #[error("{}", .0.message)]
    Remote(ErrorObject),
}

/// Result type alias for webrpc operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Json {
            message: err.to_string(),
        }
    }
}

impl RpcError {
    /// Convert to a JSON-RPC error code.
    ///
    /// Remote failures keep the code they arrived with. Local failures map to:
    /// - -32700: JSON (de)serialization failure
    /// - -32602: Bad API or function name supplied by the caller
    /// - -32601: Call to an API or function the injector does not know
    /// - -32000: Everything else (timeouts, closed endpoints, transport)
    pub fn to_rpc_error_code(&self) -> i64 {
        match self {
            RpcError::Remote(error) => error.code,
            RpcError::Json { .. } => codes::PARSE_ERROR,
            RpcError::InvalidApiName | RpcError::InvalidOrigin { .. } => codes::INVALID_PARAMS,
            RpcError::ApiNotDefined { .. } | RpcError::FunctionNotDefined { .. } => {
                codes::METHOD_NOT_FOUND
            }
            _ => codes::SERVER_ERROR,
        }
    }

    /// The remote error object, when this failure came back over the wire.
    pub fn remote(&self) -> Option<&ErrorObject> {
        match self {
            RpcError::Remote(error) => Some(error),
            _ => None,
        }
    }

    /// Check whether the remote server reported an unknown or private method.
    pub fn is_method_not_found(&self) -> bool {
        self.remote()
            .map(|error| error.code == codes::METHOD_NOT_FOUND)
            .unwrap_or(false)
    }

    /// Check whether the call was abandoned because its deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout(_))
    }
}

/// Failure raised by an API implementation while handling a dispatched call.
///
/// `code` is optional: failures without one are reported with the generic
/// "Server error" code when serialized.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub code: Option<i64>,
    pub name: Option<String>,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    /// Create an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            name: None,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Invalid params - an argument is missing or has the wrong type.
    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::new(format!("Invalid params: {}", details.into())).with_code(codes::INVALID_PARAMS)
    }

    /// Method not found.
    pub fn method_not_found() -> Self {
        Self::new("Method not found").with_code(codes::METHOD_NOT_FOUND)
    }

    /// Internal error.
    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(format!("Internal error: {}", details.into())).with_code(codes::INTERNAL_ERROR)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_params(err.to_string())
    }
}

impl From<RpcError> for ApiError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Remote(error) => ApiError {
                code: Some(error.code),
                name: error.name,
                message: error.message,
                details: error.details,
            },
            other => ApiError::new(other.to_string()).with_code(other.to_rpc_error_code()),
        }
    }
}
