//! webrpc core - JSON-RPC 2.0 between browsing contexts.
//!
//! A host page and the web application it embeds (in an iframe or a popup)
//! talk to each other by posting messages. This crate layers request/response
//! correlation on top of that channel:
//!
//! - **Client**: sends requests to one remote context and settles each call
//!   when its response arrives, its deadline elapses, or the client closes
//! - **Server**: dispatches requests from one remote context to registered APIs
//! - **Injector**: builds typed-by-name proxies for remote APIs
//! - **Protocol**: envelope types, validators and error (de)serialization
//! - **Transport**: the message-passing seam, with an in-process implementation
//!
//! # Example
//!
//! ```rust,ignore
//! use webrpc_core::{ApiDefinition, CallOptions, Client, MemoryWindow};
//!
//! let host = MemoryWindow::new("https://host.example");
//! let app = MemoryWindow::new("https://app.example");
//!
//! let client = Client::new(host.clone());
//! let injector = client.connect("https://app.example", host.handle_to(&app))?;
//! let math = injector.define("math", ApiDefinition::with_functions(["add"]))?;
//!
//! let sum = math.call("add", vec![2.into(), 3.into()]).await?;
//! ```

pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod injector;
pub mod pending;
pub mod protocol;
pub mod server;
pub mod transport;

pub use cancel::CancellationToken;
pub use client::Client;
pub use config::{CallOptions, RpcConfig};
pub use error::{ApiError, Result, RpcError};
pub use injector::{ApiDefinition, FunctionDefinition, Injector, RemoteApi};
pub use protocol::{codes, ErrorObject, MethodName, Request, Response};
pub use server::{param, Api, ApiRegistry, ListenOptions, MethodTable, Server};
pub use transport::{
    Handle, HandleId, MemoryWindow, MessageEvent, MessageTarget, Subscription, TargetHandle,
    Transport,
};
