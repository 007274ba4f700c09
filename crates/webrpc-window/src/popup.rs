//! Popup windows and the watchdog that notices them closing.
//!
//! A popup can be closed by the user at any time, and a cross-origin popup
//! gives no reliable close event. The watchdog combines two signals:
//!
//! - an `Unload` navigation event that the host did not cause, i.e. one not
//!   preceded by `set_location` (cleared again by the next `Load`)
//! - a poll of `is_closed()` every [`WindowConfig::POPUP_POLL_INTERVAL`]
//!
//! Either one destroys the dialog, which releases the watchdog and notifies
//! close listeners exactly once.

use crate::config::WindowConfig;
use crate::error::{Result, WindowError};
use crate::surface::{CloseListener, CloseListeners, Surface};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use webrpc_core::{CancellationToken, Handle, TargetHandle};

/// Navigation lifecycle events of a popup's document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationEvent {
    Load,
    Unload,
}

/// Platform side of an opened popup window.
pub trait PopupWindow: Send + Sync {
    /// Handle for posting messages to the popup.
    fn handle(&self) -> Handle;

    fn is_closed(&self) -> bool;

    fn close(&self);

    /// Navigate the popup to `url`, replacing the current history entry.
    fn replace_location(&self, url: &str) -> webrpc_core::Result<()>;

    /// Subscribe to the popup's load/unload events.
    fn navigation_events(&self) -> mpsc::UnboundedReceiver<NavigationEvent>;
}

/// Geometry of the opening window, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub screen_x: i32,
    pub screen_y: i32,
    pub inner_width: u32,
    pub inner_height: u32,
}

/// Platform side of the opening window.
pub trait WindowOpener: Send + Sync {
    fn open(&self, url: &str, name: &str, features: &PopupFeatures) -> Result<Arc<dyn PopupWindow>>;

    fn viewport(&self) -> Viewport;
}

/// Requested popup placement. Missing coordinates centre the popup over the
/// opener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupBounds {
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_width() -> u32 {
    WindowConfig::DEFAULT_POPUP_WIDTH
}

fn default_height() -> u32 {
    WindowConfig::DEFAULT_POPUP_HEIGHT
}

impl Default for PopupBounds {
    fn default() -> Self {
        Self {
            x: None,
            y: None,
            width: WindowConfig::DEFAULT_POPUP_WIDTH,
            height: WindowConfig::DEFAULT_POPUP_HEIGHT,
        }
    }
}

/// Final popup geometry passed to the opener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupFeatures {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl PopupFeatures {
    /// Clamp `bounds` to the opener's inner size and centre it on any axis
    /// without an explicit position.
    pub fn place(bounds: &PopupBounds, viewport: &Viewport) -> Self {
        let width = bounds.width.min(viewport.inner_width);
        let height = bounds.height.min(viewport.inner_height);
        let left = bounds
            .x
            .unwrap_or(viewport.screen_x + ((viewport.inner_width - width) / 2) as i32);
        let top = bounds
            .y
            .unwrap_or(viewport.screen_y + ((viewport.inner_height - height) / 2) as i32);
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Window features string for the platform's `open` call.
    pub fn to_feature_string(&self) -> String {
        format!(
            "menubar=no,location=no,resizable=no,scrollbars=no,status=no,\
             width={},height={},left={},top={}",
            self.width, self.height, self.left, self.top
        )
    }
}

/// Background task watching a popup for closure.
///
/// Calls its `on_closed` callback at most once, and never after `stop()`.
pub struct PopupWatchdog {
    location_changing: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl PopupWatchdog {
    /// Start watching `popup`. `navigating` should be true when a navigation
    /// is already under way (the popup was just opened on a URL).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(
        popup: Arc<dyn PopupWindow>,
        poll_interval: Duration,
        navigating: bool,
        on_closed: F,
    ) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let location_changing = Arc::new(AtomicBool::new(navigating));
        let shutdown = CancellationToken::new();

        let flag = location_changing.clone();
        let token = shutdown.clone();
        let mut events = popup.navigation_events();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut events_open = true;

            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {
                        if popup.is_closed() {
                            info!("Popup window was closed");
                            break;
                        }
                    }
                    event = events.recv(), if events_open => match event {
                        Some(NavigationEvent::Load) => {
                            debug!("Popup loaded; clearing location change flag");
                            flag.store(false, Ordering::SeqCst);
                        }
                        Some(NavigationEvent::Unload) => {
                            if flag.load(Ordering::SeqCst) {
                                debug!("Popup unloaded for an expected location change");
                            } else {
                                info!("Popup unloaded unexpectedly");
                                break;
                            }
                        }
                        None => events_open = false,
                    },
                }
            }

            if !token.is_cancelled() {
                on_closed();
            }
        });

        Self {
            location_changing,
            shutdown,
        }
    }

    /// Mark the next unload as host-initiated.
    pub fn begin_navigation(&self) {
        self.location_changing.store(true, Ordering::SeqCst);
    }

    pub fn is_location_changing(&self) -> bool {
        self.location_changing.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for PopupWatchdog {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct PopupInner {
    popup: Arc<dyn PopupWindow>,
    url: Mutex<String>,
    watchdog: OnceLock<PopupWatchdog>,
    destroyed: AtomicBool,
    listeners: CloseListeners,
}

impl PopupInner {
    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(watchdog) = self.watchdog.get() {
            watchdog.stop();
        }
        self.popup.close();
        info!("Popup dialog destroyed");
        self.listeners.fire();
    }
}

/// A remote web app presented in a popup window.
#[derive(Clone)]
pub struct PopupDialog {
    inner: Arc<PopupInner>,
}

impl PopupDialog {
    /// Open a popup on `url` through `opener`, placed according to `bounds`.
    pub fn open(opener: &dyn WindowOpener, url: &str, bounds: PopupBounds) -> Result<Self> {
        let features = PopupFeatures::place(&bounds, &opener.viewport());
        debug!("Opening popup: {}", features.to_feature_string());
        let popup = opener.open(url, WindowConfig::POPUP_WINDOW_NAME, &features)?;
        Ok(Self::start(popup, url, true))
    }

    /// Watch a popup that is already open and loaded.
    pub fn attach(popup: Arc<dyn PopupWindow>, url: &str) -> Self {
        Self::start(popup, url, false)
    }

    fn start(popup: Arc<dyn PopupWindow>, url: &str, navigating: bool) -> Self {
        let inner = Arc::new(PopupInner {
            popup: popup.clone(),
            url: Mutex::new(url.to_string()),
            watchdog: OnceLock::new(),
            destroyed: AtomicBool::new(false),
            listeners: CloseListeners::new(),
        });

        let weak: Weak<PopupInner> = Arc::downgrade(&inner);
        let watchdog = PopupWatchdog::spawn(
            popup,
            WindowConfig::POPUP_POLL_INTERVAL,
            navigating,
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.destroy();
                }
            },
        );
        let _ = inner.watchdog.set(watchdog);

        Self { inner }
    }

    /// Navigate the popup without the resulting unload counting as a close.
    pub fn set_location(&self, url: &str) -> Result<()> {
        if self.is_destroyed() {
            return Err(WindowError::Destroyed);
        }
        *self.inner.url.lock().unwrap_or_else(PoisonError::into_inner) = url.to_string();
        if let Some(watchdog) = self.inner.watchdog.get() {
            watchdog.begin_navigation();
        }
        self.inner.popup.replace_location(url)?;
        Ok(())
    }

    pub fn url(&self) -> String {
        self.inner
            .url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.is_destroyed() || self.inner.popup.is_closed()
    }
}

impl Surface for PopupDialog {
    fn handle(&self) -> TargetHandle {
        TargetHandle::Ready(self.inner.popup.handle())
    }

    /// Popups are visible from the moment they open.
    fn show(&self) {}

    /// A popup cannot be hidden, only closed.
    fn hide(&self) {
        self.inner.destroy();
    }

    fn destroy(&self) {
        self.inner.destroy();
    }

    fn on_close(&self, listener: CloseListener) {
        self.inner.listeners.add(listener);
    }
}
