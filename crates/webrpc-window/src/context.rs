//! Host-side context for one embedded web app.
//!
//! `create_window` wires everything the host needs:
//! 1. a [`WebAppWindow`] over the given surface
//! 2. the window registered as the `core.control` API on the host's server
//! 3. the server listening on the app URL's origin, ignoring unknown APIs so
//!    other servers can share the transport
//! 4. once the app calls `ready`, the client connected back to it
//!
//! The returned [`Injector`] is how the host calls APIs the app defines.

use crate::config::{WindowConfig, WindowOptions};
use crate::error::{Result, WindowError};
use crate::surface::Surface;
use crate::window::WebAppWindow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use webrpc_core::protocol::parse_origin;
use webrpc_core::{Client, Injector, ListenOptions, RpcConfig, Server, Transport};

#[derive(Default)]
struct ContextState {
    loaded: bool,
    closed: bool,
    window: Option<WebAppWindow>,
}

/// Host-side connection to a single remote web app. Single use.
pub struct WebAppContext {
    client: Client,
    server: Server,
    state: Mutex<ContextState>,
}

impl WebAppContext {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            client: Client::new(transport.clone()),
            server: Server::new(transport),
            state: Mutex::new(ContextState::default()),
        }
    }

    /// Load the app at `url` into `surface` and wait for it to become ready.
    ///
    /// Uses [`WindowConfig::CONTEXT_LOAD_TIMEOUT`].
    pub async fn create_window(&self, url: &str, surface: Arc<dyn Surface>) -> Result<Injector> {
        self.create_window_with(
            url,
            surface,
            WindowOptions::with_timeout(WindowConfig::CONTEXT_LOAD_TIMEOUT),
        )
        .await
    }

    pub async fn create_window_with(
        &self,
        url: &str,
        surface: Arc<dyn Surface>,
        options: WindowOptions,
    ) -> Result<Injector> {
        let origin = parse_origin(url)?;
        let window = {
            let mut state = self.lock_state();
            if state.closed {
                return Err(WindowError::Closed);
            }
            if state.loaded {
                return Err(WindowError::AlreadyLoaded);
            }
            state.loaded = true;

            let window = WebAppWindow::new(surface, options);
            state.window = Some(window.clone());
            window
        };

        self.server
            .define(RpcConfig::CONTROL_API, Arc::new(window.clone()))?;
        self.server.listen(
            &origin,
            ListenOptions::new(window.handle()).ignore_unknown_api(true),
        )?;

        debug!("Waiting for web application at {} to become ready", origin);
        window.wait_ready().await?;

        let injector = self.client.connect(&origin, window.handle())?;
        info!("Connected to web application at {}", origin);
        Ok(injector)
    }

    /// Destroy the window and stop both endpoints. Safe to call more than once.
    pub fn close(&self) {
        let window = {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.window.clone()
        };
        if let Some(window) = window {
            window.destroy();
        }
        self.server.close();
        self.client.close();
        debug!("Web application context closed");
    }

    /// The window created by `create_window`, if any.
    pub fn window(&self) -> Option<WebAppWindow> {
        self.lock_state().window.clone()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    fn lock_state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WebAppContext {
    fn drop(&mut self) {
        self.close();
    }
}
