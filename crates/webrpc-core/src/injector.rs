//! Remote API proxies.
//!
//! An [`Injector`] is what `Client::connect` hands back: it turns an API
//! definition (a list of function names, each with optional call options)
//! into a [`RemoteApi`] whose `call` forwards to `Client::send` under the
//! qualified name `"<api>.<function>"`.

use crate::client::Client;
use crate::config::CallOptions;
use crate::error::{Result, RpcError};
use crate::protocol::qualify;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// One remotely callable function.
///
/// Deserializes from either a bare name or `{"name": ..., "options": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FunctionSpec")]
pub struct FunctionDefinition {
    pub name: String,
    pub options: CallOptions,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FunctionSpec {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        options: CallOptions,
    },
}

impl From<FunctionSpec> for FunctionDefinition {
    fn from(raw: FunctionSpec) -> Self {
        match raw {
            FunctionSpec::Name(name) => Self::new(name),
            FunctionSpec::Full { name, options } => Self { name, options },
        }
    }
}

impl FunctionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: CallOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }
}

impl From<&str> for FunctionDefinition {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FunctionDefinition {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// The functions a remote API exposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiDefinition {
    pub functions: Vec<FunctionDefinition>,
}

impl ApiDefinition {
    pub fn with_functions<I, F>(functions: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FunctionDefinition>,
    {
        Self {
            functions: functions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Proxy for a named API on the remote server.
#[derive(Clone)]
pub struct RemoteApi {
    name: String,
    client: Client,
    functions: HashMap<String, CallOptions>,
}

impl RemoteApi {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_function(&self, function: &str) -> bool {
        self.functions.contains_key(function)
    }

    /// Call `function` with positional `args`, using the options it was
    /// defined with.
    pub async fn call(&self, function: &str, args: Vec<Value>) -> Result<Value> {
        let options = self
            .functions
            .get(function)
            .ok_or_else(|| RpcError::FunctionNotDefined {
                api: self.name.clone(),
                function: function.to_string(),
            })?;
        self.client
            .send(&qualify(&self.name, function), args, options)
            .await
    }
}

impl std::fmt::Debug for RemoteApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteApi")
            .field("name", &self.name)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Factory and cache of [`RemoteApi`] proxies for one client connection.
#[derive(Clone)]
pub struct Injector {
    client: Client,
    apis: Arc<Mutex<HashMap<String, Arc<RemoteApi>>>>,
}

impl Injector {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            apis: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The client this injector sends through.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Build and cache the proxy for `name`, replacing any earlier
    /// definition under the same name.
    pub fn define(&self, name: &str, definition: ApiDefinition) -> Result<Arc<RemoteApi>> {
        let api = self.build(name, definition)?;
        if self
            .lock_apis()
            .insert(name.to_string(), api.clone())
            .is_some()
        {
            debug!("Redefined remote API \"{}\"", name);
        } else {
            debug!("Defined remote API \"{}\"", name);
        }
        Ok(api)
    }

    /// Get the cached proxy for `name`, defining it from `definition` on
    /// first use.
    pub fn get(&self, name: &str, definition: Option<ApiDefinition>) -> Result<Arc<RemoteApi>> {
        match self.lock_apis().entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let definition = definition.ok_or_else(|| RpcError::ApiNotDefined {
                    name: name.to_string(),
                })?;
                let api = entry.insert(self.build(name, definition)?).clone();
                debug!("Defined remote API \"{}\"", name);
                Ok(api)
            }
        }
    }

    fn build(&self, name: &str, definition: ApiDefinition) -> Result<Arc<RemoteApi>> {
        if name.is_empty() {
            return Err(RpcError::InvalidApiName);
        }
        Ok(Arc::new(RemoteApi {
            name: name.to_string(),
            client: self.client.clone(),
            functions: definition
                .functions
                .into_iter()
                .map(|function| (function.name, function.options))
                .collect(),
        }))
    }

    fn lock_apis(&self) -> MutexGuard<'_, HashMap<String, Arc<RemoteApi>>> {
        self.apis.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut apis: Vec<String> = self.lock_apis().keys().cloned().collect();
        apis.sort();
        f.debug_struct("Injector")
            .field("client", &self.client)
            .field("apis", &apis)
            .finish()
    }
}
