//! Remote side: a web app running inside a host's `WebAppContext`.

use crate::error::{Result, WindowError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use webrpc_core::protocol::parse_origin;
use webrpc_core::{
    ApiDefinition, Client, Injector, ListenOptions, RemoteApi, RpcConfig, Server, TargetHandle,
    Transport,
};

/// A web app that serves APIs to, and controls its window through, the
/// origin that embedded it.
pub struct WebApp {
    origin: String,
    transport: Arc<dyn Transport>,
    client: Mutex<Client>,
    server: Server,
    control: Mutex<Option<Arc<RemoteApi>>>,
}

impl WebApp {
    /// `origin` is the embedding host's origin.
    pub fn new(transport: Arc<dyn Transport>, origin: &str) -> Result<Self> {
        Ok(Self {
            origin: parse_origin(origin)?,
            client: Mutex::new(Client::new(transport.clone())),
            server: Server::new(transport.clone()),
            transport,
            control: Mutex::new(None),
        })
    }

    /// Server on which this app defines the APIs the host may call.
    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Connect to the host through `parent`, start serving, and tell the
    /// host's window controller that the app is ready.
    ///
    /// On failure nothing stays connected or listening, and `connect` may be
    /// called again.
    pub async fn connect(&self, parent: impl Into<TargetHandle>) -> Result<Injector> {
        let parent = parent.into();
        let client = self.lock_client().clone();
        let injector = client.connect(&self.origin, parent.clone())?;

        match self.announce(&injector, parent).await {
            Ok(control) => {
                *self.lock_control() = Some(control);
                debug!("Web application connected to {}", self.origin);
                Ok(injector)
            }
            Err(e) => {
                warn!("Web application failed to connect to {}: {}", self.origin, e);
                self.server.close();
                client.close();
                // A closed client cannot reconnect.
                *self.lock_client() = Client::new(self.transport.clone());
                Err(e)
            }
        }
    }

    async fn announce(&self, injector: &Injector, parent: TargetHandle) -> Result<Arc<RemoteApi>> {
        let control = injector.define(
            RpcConfig::CONTROL_API,
            ApiDefinition::with_functions(["ready", "show", "hide"]),
        )?;
        self.server.listen(&self.origin, ListenOptions::new(parent))?;
        control.call("ready", vec![]).await?;
        Ok(control)
    }

    pub fn is_connected(&self) -> bool {
        self.lock_control().is_some()
    }

    /// Ask the host to show this app's window.
    pub async fn show(&self) -> Result<()> {
        self.control("show")?.call("show", vec![]).await?;
        Ok(())
    }

    /// Ask the host to hide this app's window.
    pub async fn hide(&self) -> Result<()> {
        self.control("hide")?.call("hide", vec![]).await?;
        Ok(())
    }

    /// Stop serving and drop the connection. Safe to call more than once.
    pub fn close(&self) {
        if self.lock_control().take().is_some() {
            self.server.close();
            self.lock_client().close();
            debug!("Web application disconnected from {}", self.origin);
        }
    }

    fn control(&self, action: &'static str) -> Result<Arc<RemoteApi>> {
        self.lock_control()
            .clone()
            .ok_or(WindowError::NotConnected { action })
    }

    fn lock_client(&self) -> MutexGuard<'_, Client> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_control(&self) -> MutexGuard<'_, Option<Arc<RemoteApi>>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
