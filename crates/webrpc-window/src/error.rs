//! Error types for window lifecycle and web app contexts.

use thiserror::Error;
use webrpc_core::{ApiError, RpcError};

/// Main error type for webrpc-window operations.
#[derive(Debug, Clone, Error)]
pub enum WindowError {
    #[error("Loading Web application window timed out.")]
    Timeout,

    #[error("Web application window closed before ready.")]
    Aborted,

    #[error("Web application window is not ready.")]
    NotReady,

    #[error("Web application window has been destroyed.")]
    Destroyed,

    #[error("AppContext already loaded.")]
    AlreadyLoaded,

    #[error("Web application context closed.")]
    Closed,

    #[error("Could not open popup window: {message}")]
    Open { message: String },

    #[error("Cannot \"{action}\" yet; not connected.")]
    NotConnected { action: &'static str },

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Result type alias for webrpc-window operations.
pub type Result<T> = std::result::Result<T, WindowError>;

impl WindowError {
    /// Kind tag carried across the wire in the error object's `name`.
    pub fn name(&self) -> &'static str {
        match self {
            WindowError::Timeout => "TimeoutError",
            WindowError::Aborted => "AbortError",
            WindowError::NotReady
            | WindowError::Destroyed
            | WindowError::AlreadyLoaded
            | WindowError::NotConnected { .. } => "InvalidStateError",
            WindowError::Closed => "ClosedError",
            WindowError::Open { .. } => "NotAllowedError",
            WindowError::Rpc(_) => "RpcError",
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            WindowError::Timeout => true,
            WindowError::Rpc(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl From<WindowError> for ApiError {
    fn from(err: WindowError) -> Self {
        match err {
            WindowError::Rpc(e) => e.into(),
            other => ApiError::new(other.to_string()).with_name(other.name()),
        }
    }
}
