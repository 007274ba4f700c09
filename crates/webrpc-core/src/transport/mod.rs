//! Message transport between browsing contexts.
//!
//! A context receives `MessageEvent`s through a [`Transport`] subscription and
//! posts to other contexts through [`MessageTarget`] handles. Every event
//! carries the sender's handle id and origin; client and server listeners use
//! both to drop messages that did not come from their peer.
//!
//! The in-process [`memory`] transport wires contexts together over tokio
//! channels and is what the test suites run on.

pub mod memory;

use crate::error::{Result, RpcError};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub use memory::MemoryWindow;

/// Identity of a browsing context, compared against `MessageEvent::source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(Uuid);

impl HandleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message delivered to a context.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Context that posted the message.
    pub source: HandleId,
    /// Origin of the posting context, as reported by the platform.
    pub origin: String,
    pub data: Value,
}

/// Something a message can be posted to.
pub trait MessageTarget: Send + Sync {
    /// Identity of the context this handle points at.
    fn id(&self) -> HandleId;

    /// Post `data` to the target if its origin matches `target_origin`
    /// (or `target_origin` is `"*"`). Mismatches are dropped silently.
    fn post_message(&self, data: Value, target_origin: &str) -> Result<()>;

    /// Whether the target context has gone away.
    fn is_closed(&self) -> bool {
        false
    }
}

pub type Handle = Arc<dyn MessageTarget>;

/// Stream of messages delivered to a context.
pub type Subscription = mpsc::UnboundedReceiver<MessageEvent>;

/// The local context's message event source.
pub trait Transport: Send + Sync {
    /// Start receiving every message posted to this context.
    fn subscribe(&self) -> Subscription;
}

/// A peer handle that is either available now or will become available.
///
/// An eventual handle is shared: the client listener, the server listener and
/// every pending `send` can await the same resolution.
#[derive(Clone)]
pub enum TargetHandle {
    Ready(Handle),
    Eventual(Shared<BoxFuture<'static, Option<Handle>>>),
}

impl TargetHandle {
    /// Wrap a future that resolves to the handle, or `None` if it never will.
    pub fn eventual<F>(future: F) -> Self
    where
        F: Future<Output = Option<Handle>> + Send + 'static,
    {
        TargetHandle::Eventual(future.boxed().shared())
    }

    /// A handle delivered later through a oneshot channel.
    ///
    /// Dropping the sender resolves the handle as unavailable.
    pub fn from_receiver(receiver: oneshot::Receiver<Handle>) -> Self {
        Self::eventual(async move { receiver.await.ok() })
    }

    /// Wait for the handle.
    pub async fn resolve(&self) -> Result<Handle> {
        match self {
            TargetHandle::Ready(handle) => Ok(handle.clone()),
            TargetHandle::Eventual(future) => {
                future.clone().await.ok_or(RpcError::HandleUnavailable)
            }
        }
    }

    /// The handle, if it is already known.
    pub fn peek(&self) -> Option<Handle> {
        match self {
            TargetHandle::Ready(handle) => Some(handle.clone()),
            TargetHandle::Eventual(future) => future.peek().cloned().flatten(),
        }
    }
}

impl From<Handle> for TargetHandle {
    fn from(handle: Handle) -> Self {
        TargetHandle::Ready(handle)
    }
}

impl fmt::Debug for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetHandle::Ready(handle) => f.debug_tuple("Ready").field(&handle.id()).finish(),
            TargetHandle::Eventual(future) => f
                .debug_tuple("Eventual")
                .field(&future.peek().map(|handle| handle.as_ref().map(|h| h.id())))
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_handle_resolves_immediately() {
        let a = MemoryWindow::new("https://a.example");
        let b = MemoryWindow::new("https://b.example");
        let target: TargetHandle = a.handle_to(&b).into();

        assert_eq!(target.resolve().await.unwrap().id(), b.id());
        assert!(target.peek().is_some());
    }

    #[tokio::test]
    async fn test_eventual_handle_resolves_for_every_clone() {
        let a = MemoryWindow::new("https://a.example");
        let b = MemoryWindow::new("https://b.example");
        let (tx, rx) = oneshot::channel();
        let target = TargetHandle::from_receiver(rx);
        let other = target.clone();
        assert!(target.peek().is_none());

        tx.send(a.handle_to(&b)).ok();

        assert_eq!(target.resolve().await.unwrap().id(), b.id());
        assert_eq!(other.resolve().await.unwrap().id(), b.id());
    }

    #[tokio::test]
    async fn test_dropped_sender_is_unavailable() {
        let (tx, rx) = oneshot::channel::<Handle>();
        let target = TargetHandle::from_receiver(rx);
        drop(tx);

        assert!(matches!(
            target.resolve().await,
            Err(RpcError::HandleUnavailable)
        ));
    }
}
