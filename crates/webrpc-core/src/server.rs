//! Dispatch server.
//!
//! Receives JSON-RPC requests from one remote context, routes each to the API
//! registered under the request's API name, and posts the outcome back.
//!
//! # Routing
//!
//! For every request that passes the origin, source and shape checks:
//! 1. unknown API with `ignore_unknown_api` set: dropped without a reply
//! 2. unknown API, private (`_`-prefixed) or unknown method: `Method not found`
//! 3. otherwise the method runs in its own task; its result or error is
//!    posted back unless the server was closed in the meantime
//!
//! Requests are dispatched independently and may complete out of order.

use crate::cancel::CancellationToken;
use crate::error::{ApiError, Result, RpcError};
use crate::protocol::{parse_origin, serialize_error, ErrorObject, Request, Response};
use crate::transport::{Handle, Subscription, TargetHandle, Transport};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, trace, warn};

/// An object whose methods can be called remotely.
#[async_trait]
pub trait Api: Send + Sync + 'static {
    /// Whether `method` is callable on this API.
    fn has_method(&self, method: &str) -> bool;

    /// Invoke `method` with positional `params`.
    async fn invoke(&self, method: &str, params: Vec<Value>) -> std::result::Result<Value, ApiError>;
}

type BoxedMethod =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, std::result::Result<Value, ApiError>> + Send + Sync>;

/// An [`Api`] assembled from closures.
///
/// ```rust,ignore
/// let math = MethodTable::new()
///     .sync_method("add", |params| {
///         let a: i64 = param(&params, 0)?;
///         let b: i64 = param(&params, 1)?;
///         Ok(json!(a + b))
///     });
/// server.define("math", Arc::new(math))?;
/// ```
#[derive(Default, Clone)]
pub struct MethodTable {
    methods: HashMap<String, BoxedMethod>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an async method.
    pub fn method<F, Fut>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ApiError>> + Send + 'static,
    {
        self.methods
            .insert(name.into(), Arc::new(move |params: Vec<Value>| method(params).boxed()));
        self
    }

    /// Add a method that completes synchronously.
    pub fn sync_method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Vec<Value>) -> std::result::Result<Value, ApiError> + Send + Sync + 'static,
    {
        self.methods.insert(
            name.into(),
            Arc::new(move |params: Vec<Value>| futures::future::ready(method(params)).boxed()),
        );
        self
    }
}

#[async_trait]
impl Api for MethodTable {
    fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    async fn invoke(&self, method: &str, params: Vec<Value>) -> std::result::Result<Value, ApiError> {
        let Some(method) = self.methods.get(method).cloned() else {
            return Err(ApiError::method_not_found());
        };
        method(params).await
    }
}

/// Deserialize the positional parameter at `index`.
///
/// A missing parameter deserializes from `null`, so `Option<T>` parameters
/// may be omitted.
pub fn param<T: DeserializeOwned>(params: &[Value], index: usize) -> std::result::Result<T, ApiError> {
    let value = params.get(index).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| ApiError::invalid_params(format!("parameter {}: {}", index, e)))
}

/// APIs registered on a server, by name.
#[derive(Default)]
pub struct ApiRegistry {
    apis: RwLock<HashMap<String, Arc<dyn Api>>>,
}

impl ApiRegistry {
    pub fn define(&self, name: &str, api: Arc<dyn Api>) -> Result<()> {
        if name.is_empty() {
            return Err(RpcError::InvalidApiName);
        }
        let mut apis = self.apis.write().unwrap_or_else(PoisonError::into_inner);
        if apis.contains_key(name) {
            return Err(RpcError::ApiAlreadyDefined {
                name: name.to_string(),
            });
        }
        apis.insert(name.to_string(), api);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Api>> {
        self.apis
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Options for [`Server::listen`].
#[derive(Debug, Clone)]
pub struct ListenOptions {
    pub handle: TargetHandle,
    pub ignore_unknown_api: bool,
}

impl ListenOptions {
    pub fn new(handle: impl Into<TargetHandle>) -> Self {
        Self {
            handle: handle.into(),
            ignore_unknown_api: false,
        }
    }

    /// Drop requests for unregistered APIs instead of answering them, so
    /// several servers can share one transport.
    pub fn ignore_unknown_api(mut self, ignore: bool) -> Self {
        self.ignore_unknown_api = ignore;
        self
    }
}

enum ServerState {
    Idle,
    Listening(CancellationToken),
}

struct ServerInner {
    transport: Arc<dyn Transport>,
    registry: Arc<ApiRegistry>,
    state: Mutex<ServerState>,
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let ServerState::Listening(shutdown) = state {
            shutdown.cancel();
        }
    }
}

/// RPC server answering requests from a single remote origin and handle.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                transport,
                registry: Arc::new(ApiRegistry::default()),
                state: Mutex::new(ServerState::Idle),
            }),
        }
    }

    /// Register `api` under `name`.
    ///
    /// APIs may be defined before or after `listen`.
    pub fn define(&self, name: &str, api: Arc<dyn Api>) -> Result<()> {
        self.inner.registry.define(name, api)?;
        debug!("Defined API \"{}\"", name);
        Ok(())
    }

    /// Start answering requests from `origin` sent by `options.handle`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn listen(&self, origin: &str, options: ListenOptions) -> Result<()> {
        let origin = parse_origin(origin)?;
        let mut state = self.lock_state();
        if let ServerState::Listening(_) = *state {
            return Err(RpcError::AlreadyListening);
        }

        let shutdown = CancellationToken::new();
        let inbox = self.inner.transport.subscribe();
        tokio::spawn(listen_loop(
            inbox,
            origin.clone(),
            options,
            self.inner.registry.clone(),
            shutdown.clone(),
        ));

        info!("RPC server listening for {}", origin);
        *state = ServerState::Listening(shutdown);
        Ok(())
    }

    /// Stop listening. Replies for calls still running are suppressed.
    ///
    /// The server may `listen` again afterwards.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), ServerState::Idle);
        if let ServerState::Listening(shutdown) = previous {
            shutdown.cancel();
            info!("RPC server closed");
        }
    }

    pub fn is_listening(&self) -> bool {
        matches!(*self.lock_state(), ServerState::Listening(_))
    }

    fn lock_state(&self) -> MutexGuard<'_, ServerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn listen_loop(
    mut inbox: Subscription,
    origin: String,
    options: ListenOptions,
    registry: Arc<ApiRegistry>,
    shutdown: CancellationToken,
) {
    let handle = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return,
        handle = options.handle.resolve() => match handle {
            Ok(handle) => handle,
            Err(e) => {
                warn!("RPC server listener stopped: {}", e);
                return;
            }
        },
    };
    let peer = handle.id();

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
        let Some(request) = Request::from_value(&event.data) else {
            trace!("Dropping message that is not a valid request");
            continue;
        };

        let name = request.method_name();
        let api = registry.get(name.api);
        if api.is_none() && options.ignore_unknown_api {
            trace!("Ignoring request for unknown API \"{}\"", name.api);
            continue;
        }

        let api = match api {
            Some(api) if !name.is_private() && api.has_method(name.method) => api,
            _ => {
                debug!("Method not found: {}", request.method);
                reply(
                    &handle,
                    &origin,
                    Response::error(request.id, ErrorObject::method_not_found()),
                );
                continue;
            }
        };

        tokio::spawn(dispatch(
            api,
            request,
            handle.clone(),
            origin.clone(),
            shutdown.clone(),
        ));
    }
}

async fn dispatch(
    api: Arc<dyn Api>,
    request: Request,
    handle: Handle,
    origin: String,
    shutdown: CancellationToken,
) {
    let method = request.method_name().method.to_string();
    let response = match api.invoke(&method, request.params).await {
        Ok(result) => Response::success(request.id, result),
        Err(e) => {
            debug!("RPC method {} failed: {}", request.method, e);
            Response::error(request.id, serialize_error(&e))
        }
    };

    if shutdown.is_cancelled() {
        debug!("Server closed; suppressing reply for {}", response.id);
        return;
    }
    reply(&handle, &origin, response);
}

fn reply(handle: &Handle, origin: &str, response: Response) {
    let result = serde_json::to_value(&response)
        .map_err(RpcError::from)
        .and_then(|data| handle.post_message(data, origin));
    if let Err(e) = result {
        warn!("Failed to post RPC response {}: {}", response.id, e);
    }
}
