//! Window lifecycle configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle and popup constants.
pub struct WindowConfig;

impl WindowConfig {
    /// How long a window may take to call `ready` before loading fails.
    pub const LOAD_TIMEOUT: Duration = Duration::from_secs(60);

    /// Load timeout used by `WebAppContext::create_window`.
    pub const CONTEXT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

    /// Interval at which a popup is checked for having been closed.
    pub const POPUP_POLL_INTERVAL: Duration = Duration::from_millis(250);

    pub const POPUP_WINDOW_NAME: &'static str = "web-app-window";
    pub const DEFAULT_POPUP_WIDTH: u32 = 500;
    pub const DEFAULT_POPUP_HEIGHT: u32 = 400;
}

/// Per-window options; `timeout` is expressed in milliseconds when serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowOptions {
    #[serde(with = "millis", default = "default_load_timeout")]
    pub timeout: Duration,
}

fn default_load_timeout() -> Duration {
    WindowConfig::LOAD_TIMEOUT
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            timeout: WindowConfig::LOAD_TIMEOUT,
        }
    }
}

impl WindowOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
