//! Centralized configuration for webrpc.
//!
//! Protocol constants live on `RpcConfig`; per-call settings are carried by
//! `CallOptions`, which deserializes from the `{timeout: <ms>}` shape used on
//! the wire-facing configuration surface.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Protocol-level configuration.
pub struct RpcConfig;

impl RpcConfig {
    pub const JSONRPC_VERSION: &'static str = "2.0";

    /// Default deadline for a single call.
    pub const CALL_TIMEOUT: Duration = Duration::from_millis(30_000);

    /// Reserved API name under which a host exposes window control.
    pub const CONTROL_API: &'static str = "core.control";

    /// Wildcard target origin accepted by `post_message`.
    pub const ANY_ORIGIN: &'static str = "*";
}

/// Options for a single `Client::send` call.
///
/// `timeout: None` waits indefinitely for the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CallOptionsConfig", into = "CallOptionsConfig")]
pub struct CallOptions {
    pub timeout: Option<Duration>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: Some(RpcConfig::CALL_TIMEOUT),
        }
    }
}

impl CallOptions {
    /// Options with an explicit timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    /// Options that never time out locally.
    pub fn no_timeout() -> Self {
        Self { timeout: None }
    }

    /// Build from a millisecond count; zero or negative disables the timeout.
    pub fn from_millis(millis: i64) -> Self {
        if millis > 0 {
            Self::with_timeout(Duration::from_millis(millis as u64))
        } else {
            Self::no_timeout()
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CallOptionsConfig {
    #[serde(default = "default_timeout_millis")]
    timeout: i64,
}

fn default_timeout_millis() -> i64 {
    RpcConfig::CALL_TIMEOUT.as_millis() as i64
}

impl From<CallOptionsConfig> for CallOptions {
    fn from(config: CallOptionsConfig) -> Self {
        CallOptions::from_millis(config.timeout)
    }
}

impl From<CallOptions> for CallOptionsConfig {
    fn from(options: CallOptions) -> Self {
        Self {
            timeout: options
                .timeout
                .map(|timeout| timeout.as_millis() as i64)
                .unwrap_or(0),
        }
    }
}
