//! Window lifecycle controller.
//!
//! A `WebAppWindow` tracks one remote web app from the moment its surface is
//! created:
//!
//! ```text
//! Loading --ready()--> Ready --destroy()--> Destroyed
//!    |                                          ^
//!    +-------------------destroy()--------------+
//! ```
//!
//! Readiness is observable through [`WebAppWindow::wait_ready`]. It settles
//! when the remote calls `ready`, fails with `Timeout` if that does not happen
//! within the load timeout, and fails with `Aborted` if the window is
//! destroyed first. The remote drives `ready`/`show`/`hide` over RPC through
//! the [`Api`] impl; `destroy` is only reachable from the host.

use crate::config::WindowOptions;
use crate::error::{Result, WindowError};
use crate::surface::Surface;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrpc_core::{Api, ApiError, TargetHandle};

/// Lifecycle phase of a remote window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    Loading,
    Ready,
    Destroyed,
}

#[derive(Debug, Clone)]
enum Readiness {
    Pending,
    Ready,
    Failed(WindowError),
}

struct WindowState {
    phase: WindowPhase,
    visible: bool,
    load_timer: Option<JoinHandle<()>>,
}

struct WindowInner {
    surface: Arc<dyn Surface>,
    handle: TargetHandle,
    state: Mutex<WindowState>,
    readiness: watch::Sender<Readiness>,
}

impl WindowInner {
    fn lock_state(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settle readiness with `outcome` if it is still pending.
    fn settle(&self, outcome: Readiness) -> bool {
        self.readiness.send_if_modified(|readiness| {
            if matches!(readiness, Readiness::Pending) {
                *readiness = outcome;
                true
            } else {
                false
            }
        })
    }
}

/// Host-side controller for one remote web app window.
#[derive(Clone)]
pub struct WebAppWindow {
    inner: Arc<WindowInner>,
}

impl WebAppWindow {
    /// Start tracking a window presented on `surface`.
    ///
    /// Arms the load timer, so this must be called from within a Tokio
    /// runtime. The window is destroyed if the surface closes on its own.
    pub fn new(surface: Arc<dyn Surface>, options: WindowOptions) -> Self {
        let (readiness, _) = watch::channel(Readiness::Pending);
        let inner = Arc::new(WindowInner {
            handle: surface.handle(),
            surface: surface.clone(),
            state: Mutex::new(WindowState {
                phase: WindowPhase::Loading,
                visible: false,
                load_timer: None,
            }),
            readiness,
        });

        let weak = Arc::downgrade(&inner);
        let timeout = options.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let state = inner.lock_state();
            if state.phase == WindowPhase::Loading
                && inner.settle(Readiness::Failed(WindowError::Timeout))
            {
                warn!(
                    "Web application window did not become ready within {:?}",
                    timeout
                );
            }
        });
        inner.lock_state().load_timer = Some(timer);

        let weak: Weak<WindowInner> = Arc::downgrade(&inner);
        surface.on_close(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                debug!("Surface closed; destroying web application window");
                WebAppWindow { inner }.destroy();
            }
        }));

        Self { inner }
    }

    /// Called by the remote app once it can receive messages.
    ///
    /// Fails with `Timeout` if the load timeout already expired. Calls after
    /// the window became ready or was destroyed are ignored.
    pub fn ready(&self) -> Result<()> {
        let mut state = self.inner.lock_state();
        if state.phase != WindowPhase::Loading {
            return Ok(());
        }
        if !self.inner.settle(Readiness::Ready) {
            return Err(WindowError::Timeout);
        }
        state.phase = WindowPhase::Ready;
        if let Some(timer) = state.load_timer.take() {
            timer.abort();
        }
        info!("Web application window ready");
        Ok(())
    }

    /// Show the window's surface.
    pub fn show(&self) -> Result<()> {
        {
            let mut state = self.inner.lock_state();
            match state.phase {
                WindowPhase::Loading => return Err(WindowError::NotReady),
                WindowPhase::Destroyed => return Err(WindowError::Destroyed),
                WindowPhase::Ready if state.visible => return Ok(()),
                WindowPhase::Ready => state.visible = true,
            }
        }
        debug!("Showing web application window");
        self.inner.surface.show();
        Ok(())
    }

    /// Hide the window's surface.
    pub fn hide(&self) -> Result<()> {
        {
            let mut state = self.inner.lock_state();
            if state.phase == WindowPhase::Destroyed {
                return Err(WindowError::Destroyed);
            }
            if !state.visible {
                return Ok(());
            }
            state.visible = false;
        }
        debug!("Hiding web application window");
        self.inner.surface.hide();
        Ok(())
    }

    /// Tear the window down. Safe to call more than once.
    ///
    /// A window destroyed while loading fails readiness with `Aborted`.
    pub fn destroy(&self) {
        {
            let mut state = self.inner.lock_state();
            if state.phase == WindowPhase::Destroyed {
                return;
            }
            state.phase = WindowPhase::Destroyed;
            state.visible = false;
            if let Some(timer) = state.load_timer.take() {
                timer.abort();
            }
            self.inner.settle(Readiness::Failed(WindowError::Aborted));
        }
        info!("Destroying web application window");
        self.inner.surface.destroy();
    }

    /// Wait until the remote app calls `ready`.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut readiness = self.inner.readiness.subscribe();
        let settled = readiness
            .wait_for(|readiness| !matches!(readiness, Readiness::Pending))
            .await
            .map_err(|_| WindowError::Aborted)?;
        match &*settled {
            Readiness::Ready => Ok(()),
            Readiness::Failed(e) => Err(e.clone()),
            Readiness::Pending => Err(WindowError::Aborted),
        }
    }

    pub fn phase(&self) -> WindowPhase {
        self.inner.lock_state().phase
    }

    pub fn is_visible(&self) -> bool {
        self.inner.lock_state().visible
    }

    /// Handle of the remote context inside the surface.
    pub fn handle(&self) -> TargetHandle {
        self.inner.handle.clone()
    }
}

/// Control API exposed to the remote app. `destroy` stays host-only.
#[async_trait]
impl Api for WebAppWindow {
    fn has_method(&self, method: &str) -> bool {
        matches!(method, "ready" | "show" | "hide")
    }

    async fn invoke(&self, method: &str, _params: Vec<Value>) -> std::result::Result<Value, ApiError> {
        match method {
            "ready" => self.ready()?,
            "show" => self.show()?,
            "hide" => self.hide()?,
            _ => return Err(ApiError::method_not_found()),
        }
        Ok(Value::Null)
    }
}
