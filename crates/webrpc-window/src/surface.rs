//! Presentation surfaces for remote web app windows.
//!
//! A surface is whatever hosts the remote context on screen: an embedded
//! frame, a popup, or just a bare handle owned by someone else. The window
//! controller only needs to show, hide and tear it down, and to hear about
//! it closing on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use webrpc_core::TargetHandle;

/// Callback run once when a surface closes.
pub type CloseListener = Box<dyn FnOnce() + Send>;

/// Something that presents a remote context.
pub trait Surface: Send + Sync {
    /// Handle for posting messages to the context inside the surface.
    fn handle(&self) -> TargetHandle;

    fn show(&self);

    fn hide(&self);

    /// Tear the surface down. Must be idempotent and must notify close
    /// listeners the first time.
    fn destroy(&self);

    /// Register a listener for the surface closing, for any reason.
    fn on_close(&self, listener: CloseListener);
}

#[derive(Default)]
struct ListenerState {
    fired: bool,
    listeners: Vec<CloseListener>,
}

/// Close listeners that fire at most once.
///
/// Listeners added after firing run immediately.
#[derive(Default)]
pub struct CloseListeners {
    state: Mutex<ListenerState>,
}

impl CloseListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: CloseListener) {
        let mut state = self.lock();
        if state.fired {
            drop(state);
            listener();
        } else {
            state.listeners.push(listener);
        }
    }

    /// Run every listener. Returns false if they already ran.
    pub fn fire(&self) -> bool {
        let listeners = {
            let mut state = self.lock();
            if state.fired {
                return false;
            }
            state.fired = true;
            std::mem::take(&mut state.listeners)
        };
        // Listeners may call back into the surface.
        for listener in listeners {
            listener();
        }
        true
    }

    pub fn is_fired(&self) -> bool {
        self.lock().fired
    }

    fn lock(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A surface that is just a handle; showing and hiding are up to its owner.
pub struct HandleSurface {
    handle: TargetHandle,
    listeners: CloseListeners,
}

impl HandleSurface {
    pub fn new(handle: impl Into<TargetHandle>) -> Self {
        Self {
            handle: handle.into(),
            listeners: CloseListeners::new(),
        }
    }
}

impl Surface for HandleSurface {
    fn handle(&self) -> TargetHandle {
        self.handle.clone()
    }

    fn show(&self) {}

    fn hide(&self) {}

    fn destroy(&self) {
        self.listeners.fire();
    }

    fn on_close(&self, listener: CloseListener) {
        self.listeners.add(listener);
    }
}

/// Platform side of an embedded frame overlay.
pub trait FrameControl: Send + Sync {
    /// Handle to the frame's content window.
    fn handle(&self) -> TargetHandle;

    fn set_visible(&self, visible: bool);

    /// Detach the frame from the page.
    fn remove(&self);
}

/// A surface backed by an embedded frame.
pub struct FrameSurface<F> {
    frame: F,
    removed: AtomicBool,
    listeners: CloseListeners,
}

impl<F: FrameControl> FrameSurface<F> {
    pub fn new(frame: F) -> Self {
        Self {
            frame,
            removed: AtomicBool::new(false),
            listeners: CloseListeners::new(),
        }
    }

    pub fn frame(&self) -> &F {
        &self.frame
    }
}

impl<F: FrameControl> Surface for FrameSurface<F> {
    fn handle(&self) -> TargetHandle {
        self.frame.handle()
    }

    fn show(&self) {
        if !self.removed.load(Ordering::SeqCst) {
            self.frame.set_visible(true);
        }
    }

    fn hide(&self) {
        if !self.removed.load(Ordering::SeqCst) {
            self.frame.set_visible(false);
        }
    }

    fn destroy(&self) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.frame.remove();
        self.listeners.fire();
    }

    fn on_close(&self, listener: CloseListener) {
        self.listeners.add(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    fn counter() -> (Arc<AtomicUsize>, CloseListener) {
        let count = Arc::new(AtomicUsize::new(0));
        let listener_count = count.clone();
        (
            count,
            Box::new(move || {
                listener_count.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_listeners_fire_once() {
        let listeners = CloseListeners::new();
        let (count, listener) = counter();
        listeners.add(listener);

        assert!(listeners.fire());
        assert!(!listeners.fire());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_listener_runs_immediately() {
        let listeners = CloseListeners::new();
        listeners.fire();

        let (count, listener) = counter();
        listeners.add(listener);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[derive(Default)]
    struct FakeFrame {
        visible: AtomicBool,
        removals: AtomicUsize,
    }

    impl FrameControl for FakeFrame {
        fn handle(&self) -> TargetHandle {
            let (_tx, rx) = oneshot::channel();
            TargetHandle::from_receiver(rx)
        }

        fn set_visible(&self, visible: bool) {
            self.visible.store(visible, Ordering::SeqCst);
        }

        fn remove(&self) {
            self.removals.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_frame_surface_toggles_and_removes_once() {
        let surface = FrameSurface::new(FakeFrame::default());
        let (closes, listener) = counter();
        surface.on_close(listener);

        surface.show();
        assert!(surface.frame().visible.load(Ordering::SeqCst));
        surface.hide();
        assert!(!surface.frame().visible.load(Ordering::SeqCst));

        surface.destroy();
        surface.destroy();
        assert_eq!(surface.frame().removals.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        surface.show();
        assert!(!surface.frame().visible.load(Ordering::SeqCst));
    }
}
