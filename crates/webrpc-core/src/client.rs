//! Correlation client.
//!
//! Sends JSON-RPC requests to one remote context and settles each call when
//! the response with the matching id comes back, the call's deadline elapses,
//! or the client is closed.
//!
//! # Thread Safety
//!
//! `Client` is a cheap `Arc` clone. Any number of tasks may `send`
//! concurrently; responses are routed by id through the shared
//! [`PendingCalls`] table, which the listener task also holds.

use crate::cancel::CancellationToken;
use crate::config::CallOptions;
use crate::error::{Result, RpcError};
use crate::injector::Injector;
use crate::pending::{PendingCalls, PendingGuard};
use crate::protocol::{parse_origin, Request, Response};
use crate::transport::{Subscription, TargetHandle, Transport};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};
use uuid::Uuid;

enum ClientState {
    Idle,
    Connected {
        origin: String,
        target: TargetHandle,
        shutdown: CancellationToken,
    },
    Closed,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    state: Mutex<ClientState>,
    pending: Arc<PendingCalls>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let ClientState::Connected { shutdown, .. } = state {
            shutdown.cancel();
        }
    }
}

/// RPC client bound to a single remote origin and handle.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create an unconnected client receiving messages through `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                state: Mutex::new(ClientState::Idle),
                pending: Arc::new(PendingCalls::new()),
            }),
        }
    }

    /// Bind to `origin` and `target` and start listening for responses.
    ///
    /// Exactly one transport subscription is registered per connection. The
    /// target may still be pending; sends wait for it to resolve. Must be
    /// called from within a Tokio runtime.
    pub fn connect(&self, origin: &str, target: impl Into<TargetHandle>) -> Result<Injector> {
        let origin = parse_origin(origin)?;
        let target = target.into();
        let mut state = self.lock_state();
        match *state {
            ClientState::Idle => {}
            ClientState::Connected { .. } => return Err(RpcError::AlreadyConnected),
            ClientState::Closed => return Err(RpcError::ClientClosed),
        }

        let shutdown = CancellationToken::new();
        let inbox = self.inner.transport.subscribe();
        tokio::spawn(listen_loop(
            inbox,
            origin.clone(),
            target.clone(),
            self.inner.pending.clone(),
            shutdown.clone(),
        ));

        debug!("RPC client connected to {}", origin);
        *state = ClientState::Connected {
            origin,
            target,
            shutdown,
        };
        Ok(Injector::new(self.clone()))
    }

    /// Call `method` (`"<api>.<method>"`) with positional `params`.
    ///
    /// Resolves with the remote result, or fails with the remote error, a
    /// timeout, or `ClientClosed` if the client is closed first.
    pub async fn send(
        &self,
        method: &str,
        params: Vec<Value>,
        options: &CallOptions,
    ) -> Result<Value> {
        let id = Uuid::new_v4().to_string();
        let data = serde_json::to_value(Request::new(id.clone(), method, params))?;
        let pending = &self.inner.pending;

        // Registered under the state lock so a concurrent close() either sees
        // this call in reject_all() or is seen here as Closed.
        let (origin, target, mut rx) = match &*self.lock_state() {
            ClientState::Connected { origin, target, .. } => {
                (origin.clone(), target.clone(), pending.register(&id, method))
            }
            ClientState::Idle => return Err(RpcError::NotConnected),
            ClientState::Closed => return Err(RpcError::ClientClosed),
        };
        let _guard = PendingGuard::new(pending, id.clone());

        let call = async {
            let handle = tokio::select! {
                handle = target.resolve() => handle?,
                // close() may reject the call before the handle is known
                outcome = &mut rx => return outcome.unwrap_or(Err(RpcError::ClientClosed)),
            };
            trace!(id = %id, method = method, "Posting request");
            handle.post_message(data, &origin)?;
            rx.await.unwrap_or(Err(RpcError::ClientClosed))
        };

        match options.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        id = %id,
                        method = method,
                        "RPC call timed out after {:?}",
                        timeout
                    );
                    Err(RpcError::Timeout(timeout))
                }
            },
            None => call.await,
        }
    }

    /// Stop listening and reject every outstanding call with `ClientClosed`.
    ///
    /// A closed client cannot be connected again.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), ClientState::Closed);
        if let ClientState::Connected { origin, shutdown, .. } = previous {
            shutdown.cancel();
            debug!("RPC client disconnected from {}", origin);
        }
        let rejected = self.inner.pending.reject_all(RpcError::ClientClosed);
        if rejected > 0 {
            debug!("Rejected {} pending RPC calls on close", rejected);
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.lock_state(), ClientState::Connected { .. })
    }

    /// Number of calls still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.lock_state() {
            ClientState::Idle => "idle".to_string(),
            ClientState::Connected { origin, .. } => format!("connected to {}", origin),
            ClientState::Closed => "closed".to_string(),
        };
        f.debug_struct("Client")
            .field("state", &state)
            .field("pending", &self.pending_count())
            .finish()
    }
}

async fn listen_loop(
    mut inbox: Subscription,
    origin: String,
    target: TargetHandle,
    pending: Arc<PendingCalls>,
    shutdown: CancellationToken,
) {
    let peer = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return,
        handle = target.resolve() => match handle {
            Ok(handle) => handle.id(),
            Err(e) => {
                warn!("RPC client listener stopped: {}", e);
                return;
            }
        },
    };

    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = inbox.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if event.source != peer || event.origin != origin {
            trace!("Dropping message from {} ({})", event.origin, event.source);
            continue;
        }
        let Some(response) = Response::from_value(&event.data) else {
            trace!("Dropping message that is not a valid response");
            continue;
        };

        let id = response.id;
        if !pending.complete(&id, response.outcome.into_result()) {
            debug!("Ignoring response for unknown call {}", id);
        }
    }
}
