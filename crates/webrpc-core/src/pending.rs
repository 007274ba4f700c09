//! Pending call table for the client.
//!
//! Maps request ids to the oneshot channel the caller of `send` is waiting on.
//!
//! Flow:
//! 1. `send` generates an id and calls `register()` before posting
//! 2. The listener receives the response and calls `complete()`
//! 3. `send` awaits the receiver or times out; either way its
//!    [`PendingGuard`] removes the entry
//! 4. `close` rejects whatever is left via `reject_all()`

use crate::error::{Result, RpcError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::debug;

struct PendingCall {
    sender: oneshot::Sender<Result<Value>>,
    method: String,
    created_at: Instant,
}

/// Outstanding calls keyed by request id.
#[derive(Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<String, PendingCall>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and get the receiver its outcome will arrive on.
    pub fn register(&self, id: &str, method: &str) -> oneshot::Receiver<Result<Value>> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(
            id.to_string(),
            PendingCall {
                sender: tx,
                method: method.to_string(),
                created_at: Instant::now(),
            },
        );
        rx
    }

    /// Resolve a call with its outcome.
    ///
    /// Returns false if no call with this id is pending.
    pub fn complete(&self, id: &str, outcome: Result<Value>) -> bool {
        let Some(call) = self.lock().remove(id) else {
            return false;
        };
        debug!(
            id = id,
            method = call.method,
            response_time_ms = call.created_at.elapsed().as_millis() as u64,
            "Completed pending call"
        );
        // The caller may have given up already; that is not an error here.
        let _ = call.sender.send(outcome);
        true
    }

    /// Forget a call without resolving it.
    pub fn remove(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Reject every pending call with `error`, returning how many there were.
    pub fn reject_all(&self, error: RpcError) -> usize {
        let drained: Vec<PendingCall> = self.lock().drain().map(|(_, call)| call).collect();
        let count = drained.len();
        for call in drained {
            let _ = call.sender.send(Err(error.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a pending call when dropped, whether the call completed, timed out
/// or the `send` future itself was dropped.
pub struct PendingGuard<'a> {
    calls: &'a PendingCalls,
    id: String,
}

impl<'a> PendingGuard<'a> {
    pub fn new(calls: &'a PendingCalls, id: impl Into<String>) -> Self {
        Self {
            calls,
            id: id.into(),
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.calls.remove(&self.id);
    }
}
