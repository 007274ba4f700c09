//! Wire protocol: JSON-RPC 2.0 envelopes exchanged between browsing contexts.
//!
//! ```text
//! request:  {"jsonrpc":"2.0","id":"<uuid>","method":"<api>.<method>","params":[...]}
//! response: {"jsonrpc":"2.0","id":"<uuid>","result":<value>}
//!       or: {"jsonrpc":"2.0","id":"<uuid>","error":{"code":-32601,"message":"Method not found"}}
//! ```
//!
//! Validation runs on raw `serde_json::Value`s because the transport hands us
//! arbitrary data posted by any context; anything that fails validation is
//! dropped by the caller and never reaches application code.

use crate::config::RpcConfig;
use crate::error::{ApiError, RpcError};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard JSON-RPC 2.0 error codes.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Default code for failures that carry no code of their own.
    pub const SERVER_ERROR: i64 = -32000;
}

/// JSON-RPC error object carried in a response's `error` member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    /// Kind tag of the original failure (e.g. `"AbortError"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            name: None,
            details: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(codes::PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(codes::INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found() -> Self {
        Self::new(codes::METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params() -> Self {
        Self::new(codes::INVALID_PARAMS, "Invalid params")
    }

    pub fn internal_error() -> Self {
        Self::new(codes::INTERNAL_ERROR, "Internal Error")
    }

    pub fn server_error() -> Self {
        Self::new(codes::SERVER_ERROR, "Server error")
    }
}

/// A method call addressed to `<api>.<method>` on the remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: RpcConfig::JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Validate and extract a request from raw transport data.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !is_valid_request(value) {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    pub fn method_name(&self) -> MethodName<'_> {
        MethodName::parse(&self.method)
    }
}

/// Exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ErrorObject),
}

impl Outcome {
    /// Convert into the value a caller of `send` observes.
    pub fn into_result(self) -> Result<Value> {
        match self {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(error) => Err(deserialize_error(error)),
        }
    }
}

/// Reply to a `Request`, echoing its `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: RpcConfig::JSONRPC_VERSION.to_string(),
            id: id.into(),
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: impl Into<String>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: RpcConfig::JSONRPC_VERSION.to_string(),
            id: id.into(),
            outcome: Outcome::Error(error),
        }
    }

    /// Validate and extract a response from raw transport data.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !is_valid_response(value) {
            return None;
        }
        let id = value.get("id")?.as_str()?;
        let outcome = match value.get("error") {
            Some(error) => Outcome::Error(serde_json::from_value(error.clone()).ok()?),
            None => Outcome::Result(value.get("result")?.clone()),
        };
        Some(Self::new_with_outcome(id, outcome))
    }

    fn new_with_outcome(id: &str, outcome: Outcome) -> Self {
        Self {
            jsonrpc: RpcConfig::JSONRPC_VERSION.to_string(),
            id: id.to_string(),
            outcome,
        }
    }
}

/// A qualified method name split into its API and method parts.
///
/// The split happens on the last dot, so API names may themselves contain
/// dots (`"core.control.show"` is method `show` of API `core.control`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodName<'a> {
    pub api: &'a str,
    pub method: &'a str,
}

impl<'a> MethodName<'a> {
    pub fn parse(qualified: &'a str) -> Self {
        match qualified.rsplit_once('.') {
            Some((api, method)) => Self { api, method },
            None => Self {
                api: qualified,
                method: "",
            },
        }
    }

    /// Methods starting with an underscore are never dispatched.
    pub fn is_private(&self) -> bool {
        self.method.starts_with('_')
    }
}

/// Join an API name and a method name into a qualified method name.
pub fn qualify(api: &str, method: &str) -> String {
    format!("{}.{}", api, method)
}

// ============================================================================
// Validators
// ============================================================================

/// Common envelope: an object with `jsonrpc: "2.0"` and a non-empty string `id`.
pub fn is_valid_message(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    object.get("jsonrpc").and_then(Value::as_str) == Some(RpcConfig::JSONRPC_VERSION)
        && object
            .get("id")
            .and_then(Value::as_str)
            .map(|id| !id.is_empty())
            .unwrap_or(false)
}

/// A request additionally carries a string `method` and an array of `params`.
pub fn is_valid_request(value: &Value) -> bool {
    is_valid_message(value)
        && value.get("method").map(Value::is_string).unwrap_or(false)
        && value.get("params").map(Value::is_array).unwrap_or(false)
}

/// A response carries exactly one of `result` / `error`; an `error` must be a
/// valid error object. Responses with neither are rejected.
pub fn is_valid_response(value: &Value) -> bool {
    if !is_valid_message(value) {
        return false;
    }
    match (value.get("result"), value.get("error")) {
        (Some(_), None) => true,
        (None, Some(error)) => is_valid_error(error),
        _ => false,
    }
}

/// An error object has an integer `code` and a string `message`.
pub fn is_valid_error(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    object.get("code").map(Value::is_i64).unwrap_or(false)
        && object.get("message").map(Value::is_string).unwrap_or(false)
        && object.get("name").map(Value::is_string).unwrap_or(true)
}

// ============================================================================
// Error (de)serialization
// ============================================================================

/// Turn an API failure into a wire error object.
///
/// Failures without a code of their own get the "Server error" code.
pub fn serialize_error(error: &ApiError) -> ErrorObject {
    ErrorObject {
        code: error.code.unwrap_or(codes::SERVER_ERROR),
        message: error.message.clone(),
        name: error.name.clone(),
        details: error.details.clone(),
    }
}

/// Rebuild a failure from a received error object.
pub fn deserialize_error(error: ErrorObject) -> RpcError {
    RpcError::Remote(error)
}

/// Normalize a URL (or bare origin) to its ASCII origin serialization.
///
/// Default ports are dropped, so `https://example.com:443/app` becomes
/// `https://example.com`.
pub fn parse_origin(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url).map_err(|e| RpcError::InvalidOrigin {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return Err(RpcError::InvalidOrigin {
            url: url.to_string(),
            message: "URL has an opaque origin".to_string(),
        });
    }
    Ok(origin.ascii_serialization())
}
