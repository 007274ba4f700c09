//! webrpc window - lifecycle of remote web app windows.
//!
//! Builds on `webrpc-core` to let a host page embed a web app (in a frame or
//! a popup), wait for it to report ready, and let the app show or hide its
//! own window through the `core.control` API.
//!
//! - [`WebAppContext`]: host side; creates the window and connects to the app
//! - [`WebApp`]: app side; connects back to the host and drives its window
//! - [`WebAppWindow`]: `Loading -> Ready -> Destroyed` state machine
//! - [`PopupDialog`] / [`PopupWatchdog`]: popups that can be closed by the user
//! - [`Surface`]: what actually puts the app on screen
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use webrpc_window::{HandleSurface, WebAppContext};
//!
//! let context = WebAppContext::new(host.clone());
//! let surface = Arc::new(HandleSurface::new(host.handle_to(&frame)));
//! let injector = context
//!     .create_window("https://app.example/widget", surface)
//!     .await?;
//! let wallet = injector.define("wallet", ApiDefinition::with_functions(["get"]))?;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod popup;
pub mod surface;
pub mod web_app;
pub mod window;

pub use config::{WindowConfig, WindowOptions};
pub use context::WebAppContext;
pub use error::{Result, WindowError};
pub use popup::{
    NavigationEvent, PopupBounds, PopupDialog, PopupFeatures, PopupWatchdog, PopupWindow,
    Viewport, WindowOpener,
};
pub use surface::{CloseListener, CloseListeners, FrameControl, FrameSurface, HandleSurface, Surface};
pub use web_app::WebApp;
pub use window::{WebAppWindow, WindowPhase};
