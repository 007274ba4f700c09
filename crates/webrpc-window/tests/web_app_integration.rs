//! End-to-end tests: a host `WebAppContext` and a remote `WebApp` talking over
//! the in-process transport.

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use webrpc_core::{param, ApiDefinition, MemoryWindow, MethodTable};
use webrpc_window::{
    CloseListener, CloseListeners, HandleSurface, Surface, WebApp, WebAppContext, WindowError,
    WindowOptions, WindowPhase,
};

const HOST: &str = "https://host.example";
const APP_URL: &str = "https://app.example/widget";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Surface that records visibility changes made on behalf of the app.
struct TrackingSurface {
    inner: HandleSurface,
    shows: AtomicUsize,
    hides: AtomicUsize,
    destroys: AtomicUsize,
}

impl TrackingSurface {
    fn new(inner: HandleSurface) -> Arc<Self> {
        Arc::new(Self {
            inner,
            shows: AtomicUsize::new(0),
            hides: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
        })
    }
}

impl Surface for TrackingSurface {
    fn handle(&self) -> webrpc_core::TargetHandle {
        self.inner.handle()
    }

    fn show(&self) {
        self.shows.fetch_add(1, Ordering::SeqCst);
    }

    fn hide(&self) {
        self.hides.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.inner.destroy();
    }

    fn on_close(&self, listener: CloseListener) {
        self.inner.on_close(listener);
    }
}

struct Setup {
    host: Arc<MemoryWindow>,
    app: Arc<MemoryWindow>,
    context: WebAppContext,
    web_app: WebApp,
    surface: Arc<TrackingSurface>,
}

fn setup() -> Setup {
    let host = MemoryWindow::new(HOST);
    let app = MemoryWindow::new("https://app.example");

    let context = WebAppContext::new(host.clone());
    let surface = TrackingSurface::new(HandleSurface::new(host.handle_to(&app)));

    let web_app = WebApp::new(app.clone(), HOST).unwrap();
    web_app
        .server()
        .define(
            "math",
            Arc::new(MethodTable::new().sync_method("add", |params| {
                let a: i64 = param(&params, 0)?;
                let b: i64 = param(&params, 1)?;
                Ok(json!(a + b))
            })),
        )
        .unwrap();

    Setup {
        host,
        app,
        context,
        web_app,
        surface,
    }
}

#[tokio::test]
async fn test_host_and_app_connect_and_call_each_other() -> anyhow::Result<()> {
    init_tracing();
    let s = setup();

    let (injector, _) = tokio::join!(
        s.context.create_window(APP_URL, s.surface.clone()),
        s.web_app.connect(s.app.handle_to(&s.host)),
    );
    let injector = injector?;
    assert!(s.web_app.is_connected());

    let window = s.context.window().expect("window created");
    assert_eq!(window.phase(), WindowPhase::Ready);

    // Host calls into the app.
    let math = injector.define("math", ApiDefinition::with_functions(["add"]))?;
    assert_eq!(math.call("add", vec![json!(2), json!(3)]).await?, json!(5));

    // App drives its window through core.control.
    s.web_app.show().await?;
    assert!(window.is_visible());
    assert_eq!(s.surface.shows.load(Ordering::SeqCst), 1);

    s.web_app.hide().await?;
    assert!(!window.is_visible());
    assert_eq!(s.surface.hides.load(Ordering::SeqCst), 1);

    s.context.close();
    assert_eq!(window.phase(), WindowPhase::Destroyed);
    assert_eq!(s.surface.destroys.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_app_cannot_call_unlisted_host_apis() -> anyhow::Result<()> {
    init_tracing();
    let s = setup();
    let (injector, connected) = tokio::join!(
        s.context.create_window(APP_URL, s.surface.clone()),
        s.web_app.connect(s.app.handle_to(&s.host)),
    );
    injector?;
    let app_injector = connected?;

    // The host's server ignores unknown APIs, so this call gets no reply.
    let wallet = app_injector.define(
        "wallet",
        ApiDefinition::with_functions([webrpc_core::FunctionDefinition::new("get")
            .with_options(webrpc_core::CallOptions::with_timeout(Duration::from_millis(100)))]),
    )?;
    let err = wallet.call("get", vec![]).await.unwrap_err();
    assert!(err.is_timeout());

    // destroy is never reachable over RPC.
    let control = app_injector.get("core.control", None)?;
    assert!(!control.has_function("destroy"));
    let err = app_injector
        .client()
        .send(
            "core.control.destroy",
            vec![],
            &webrpc_core::CallOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(err.is_method_not_found());
    assert_eq!(
        s.context.window().map(|window| window.phase()),
        Some(WindowPhase::Ready)
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_create_window_times_out_without_app() {
    init_tracing();
    let s = setup();

    let err = s
        .context
        .create_window_with(
            APP_URL,
            s.surface.clone(),
            WindowOptions::with_timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WindowError::Timeout));
    assert_eq!(err.to_string(), "Loading Web application window timed out.");
}

#[tokio::test(start_paused = true)]
async fn test_default_context_timeout_is_ten_seconds() {
    init_tracing();
    let s = setup();

    let started = tokio::time::Instant::now();
    let err = s
        .context
        .create_window(APP_URL, s.surface.clone())
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_context_is_single_use() {
    init_tracing();
    let s = setup();

    let first = s.context.create_window_with(
        APP_URL,
        s.surface.clone(),
        WindowOptions::with_timeout(Duration::from_millis(10)),
    );
    let _ = first.await;

    let err = s
        .context
        .create_window(APP_URL, s.surface.clone())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "AppContext already loaded.");
}

#[tokio::test]
async fn test_close_while_loading_aborts() {
    init_tracing();
    let s = setup();

    let (result, _) = tokio::join!(
        s.context.create_window(APP_URL, s.surface.clone()),
        async {
            tokio::task::yield_now().await;
            s.context.close();
        }
    );

    assert!(matches!(result, Err(WindowError::Aborted)));
    assert_eq!(
        result.unwrap_err().to_string(),
        "Web application window closed before ready."
    );
    assert_eq!(s.surface.destroys.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_surface_closing_destroys_window() {
    init_tracing();
    let s = setup();
    let (injector, _) = tokio::join!(
        s.context.create_window(APP_URL, s.surface.clone()),
        s.web_app.connect(s.app.handle_to(&s.host)),
    );
    injector.unwrap();

    // e.g. the user closed the frame's container
    s.surface.inner.destroy();

    let window = s.context.window().unwrap();
    assert_eq!(window.phase(), WindowPhase::Destroyed);
    let err = s.web_app.show().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Web application window has been destroyed."
    );
}

#[tokio::test]
async fn test_failed_connect_leaves_app_disconnected_and_retryable() -> anyhow::Result<()> {
    init_tracing();
    let s = setup();

    // The host gives up before the app announces itself.
    let err = s
        .context
        .create_window_with(
            APP_URL,
            s.surface.clone(),
            WindowOptions::with_timeout(Duration::from_millis(10)),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let err = s.web_app.connect(s.app.handle_to(&s.host)).await.unwrap_err();
    assert_eq!(err.to_string(), "Loading Web application window timed out.");
    assert!(!s.web_app.is_connected());
    assert!(!s.web_app.server().is_listening());
    let err = s.web_app.show().await.unwrap_err();
    assert_eq!(err.to_string(), "Cannot \"show\" yet; not connected.");

    // A fresh host context accepts the retry.
    s.context.close();
    let context = WebAppContext::new(s.host.clone());
    let surface = TrackingSurface::new(HandleSurface::new(s.host.handle_to(&s.app)));
    let (injector, connected) = tokio::join!(
        context.create_window(APP_URL, surface.clone()),
        s.web_app.connect(s.app.handle_to(&s.host)),
    );
    let injector = injector?;
    connected?;
    assert!(s.web_app.is_connected());

    let math = injector.define("math", ApiDefinition::with_functions(["add"]))?;
    assert_eq!(math.call("add", vec![json!(4), json!(5)]).await?, json!(9));
    s.web_app.show().await?;
    assert_eq!(surface.shows.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_web_app_requires_connect() {
    init_tracing();
    let s = setup();

    let err = s.web_app.show().await.unwrap_err();
    assert_eq!(err.to_string(), "Cannot \"show\" yet; not connected.");
    let err = s.web_app.hide().await.unwrap_err();
    assert_eq!(err.to_string(), "Cannot \"hide\" yet; not connected.");

    // Closing an unconnected app is a no-op.
    s.web_app.close();
    s.web_app.close();
}

#[test]
fn test_close_listeners_exported_for_custom_surfaces() {
    let listeners = CloseListeners::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    listeners.add(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    assert!(listeners.fire());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
