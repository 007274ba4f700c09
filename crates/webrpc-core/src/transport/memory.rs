//! In-process transport.
//!
//! Each `MemoryWindow` stands in for one browsing context with a fixed
//! origin. `handle_to` produces a `Handle` through which one window posts to
//! another; delivery stamps the event with the sender's id and origin, the
//! same way a browser fills in `event.source` and `event.origin`.

use super::{Handle, HandleId, MessageEvent, MessageTarget, Subscription, Transport};
use crate::config::RpcConfig;
use crate::error::Result;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

/// A simulated browsing context.
#[derive(Debug)]
pub struct MemoryWindow {
    id: HandleId,
    origin: String,
    listeners: Mutex<Vec<mpsc::UnboundedSender<MessageEvent>>>,
    closed: AtomicBool,
}

impl MemoryWindow {
    pub fn new(origin: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: HandleId::new(),
            origin: origin.into(),
            listeners: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// A handle through which `self` posts messages to `target`.
    pub fn handle_to(self: &Arc<Self>, target: &Arc<MemoryWindow>) -> Handle {
        Arc::new(MemoryHandle {
            sender: self.clone(),
            target: target.clone(),
        })
    }

    /// Mark the context as gone. Later posts to it are dropped and existing
    /// subscriptions end.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.lock_listeners().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.lock_listeners();
        listeners.retain(|listener| !listener.is_closed());
        listeners.len()
    }

    /// Deliver an event with arbitrary source and origin.
    pub fn inject(&self, event: MessageEvent) {
        self.deliver(event);
    }

    fn deliver(&self, event: MessageEvent) {
        if self.is_closed() {
            return;
        }
        let mut listeners = self.lock_listeners();
        listeners.retain(|listener| listener.send(event.clone()).is_ok());
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<MessageEvent>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MemoryWindow {
    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.is_closed() {
            self.lock_listeners().push(tx);
        }
        rx
    }
}

struct MemoryHandle {
    sender: Arc<MemoryWindow>,
    target: Arc<MemoryWindow>,
}

impl MessageTarget for MemoryHandle {
    fn id(&self) -> HandleId {
        self.target.id
    }

    fn post_message(&self, data: Value, target_origin: &str) -> Result<()> {
        if target_origin != RpcConfig::ANY_ORIGIN && target_origin != self.target.origin {
            trace!(
                "Dropping message for {}: target origin {} does not match",
                self.target.origin,
                target_origin
            );
            return Ok(());
        }
        self.target.deliver(MessageEvent {
            source: self.sender.id,
            origin: self.sender.origin.clone(),
            data,
        });
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.target.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_delivery_stamps_sender() {
        let a = MemoryWindow::new("https://a.example");
        let b = MemoryWindow::new("https://b.example");
        let mut inbox = b.subscribe();

        a.handle_to(&b)
            .post_message(json!({"hello": 1}), "https://b.example")
            .unwrap();

        let event = inbox.recv().await.unwrap();
        assert_eq!(event.source, a.id());
        assert_eq!(event.origin, "https://a.example");
        assert_eq!(event.data, json!({"hello": 1}));
    }

    #[tokio::test]
    async fn test_origin_mismatch_is_dropped() {
        let a = MemoryWindow::new("https://a.example");
        let b = MemoryWindow::new("https://b.example");
        let mut inbox = b.subscribe();
        let handle = a.handle_to(&b);

        handle.post_message(json!(1), "https://evil.example").unwrap();
        handle.post_message(json!(2), "*").unwrap();

        assert_eq!(inbox.recv().await.unwrap().data, json!(2));
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_window_ends_subscriptions() {
        let a = MemoryWindow::new("https://a.example");
        let b = MemoryWindow::new("https://b.example");
        let mut inbox = b.subscribe();
        let handle = a.handle_to(&b);

        b.close();
        handle.post_message(json!(1), "*").unwrap();

        assert!(handle.is_closed());
        assert!(inbox.recv().await.is_none());
        assert_eq!(b.listener_count(), 0);
    }

    #[test]
    fn test_listener_count_prunes_dropped_receivers() {
        let b = MemoryWindow::new("https://b.example");
        let first = b.subscribe();
        let _second = b.subscribe();
        assert_eq!(b.listener_count(), 2);

        drop(first);
        assert_eq!(b.listener_count(), 1);
    }
}
