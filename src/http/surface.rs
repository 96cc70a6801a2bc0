//! Web surface shared by the emulation API, system control and discovery.
//!
//! # Responsibilities
//! - Hold per-run listener settings (address, port, TLS, static assets)
//! - Serve a route table that collaborators extend while the surface runs
//! - Report listener startup failures to the installed failure handler
//! - Provide a readiness barrier and an orderly stop
//!
//! # Design Decisions
//! - Listener startup runs on its own task; failures never reach the caller
//!   of `start`, only the failure handler
//! - The route table lives behind `arc-swap`; the served router dispatches to
//!   the current table so routes added after `start` are live immediately
//! - `stop` waits for the listener task so the port is free for the next run

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::extract::Request;
use axum::Router;
use axum_server::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::service_fn;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::http::ListenerError;
use crate::net::tls;

/// Grace period for in-flight requests when the surface stops.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Receives listener startup failures on the listener's task.
pub type FailureHandler = Arc<dyn Fn(ListenerError) + Send + Sync>;

/// Operations the supervisor needs from the web surface.
#[async_trait]
pub trait WebSurface: Send + Sync {
    /// One-time initialization, performed on the first iteration only.
    fn init(&self);

    fn configure_secure_transport(&self, keystore: &Path, passphrase: &str);

    fn set_listen_address(&self, address: IpAddr);

    fn set_listen_port(&self, port: u16);

    fn set_static_asset_root(&self, root: &Path);

    fn install_failure_handler(&self, handler: FailureHandler);

    /// Merge `routes` into the served route table.
    fn add_routes(&self, routes: Router);

    /// Start the listener on a background task.
    fn start(&self);

    /// Block until the listener serves the route table.
    ///
    /// Returns the bound address, or `None` when the listener failed to
    /// start (the failure went to the failure handler).
    async fn await_route_registration(&self) -> Option<SocketAddr>;

    /// Stop the listener and reset per-run settings and routes.
    async fn stop(&self);
}

#[derive(Clone)]
struct Keystore {
    path: PathBuf,
    passphrase: String,
}

#[derive(Clone)]
struct ListenerSettings {
    address: IpAddr,
    port: u16,
    keystore: Option<Keystore>,
    static_root: Option<PathBuf>,
    failure_handler: Option<FailureHandler>,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 80,
            keystore: None,
            static_root: None,
            failure_handler: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Idle,
    Pending,
    Listening(SocketAddr),
    Failed,
}

struct RunningListener {
    handle: Handle,
    task: JoinHandle<()>,
}

/// Axum-based web surface.
pub struct HttpSurface {
    settings: Mutex<ListenerSettings>,
    routes: Arc<ArcSwap<Router>>,
    front: OnceLock<Router>,
    running: Mutex<Option<RunningListener>>,
    ready: Arc<watch::Sender<Readiness>>,
}

impl HttpSurface {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(Readiness::Idle);
        Self {
            settings: Mutex::new(ListenerSettings::default()),
            routes: Arc::new(ArcSwap::from_pointee(Router::new())),
            front: OnceLock::new(),
            running: Mutex::new(None),
            ready: Arc::new(ready),
        }
    }

    fn lock_settings(&self) -> MutexGuard<'_, ListenerSettings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningListener>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HttpSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebSurface for HttpSurface {
    fn init(&self) {
        let routes = Arc::clone(&self.routes);
        let dispatch = service_fn(move |request: Request| {
            let table = routes.load_full();
            async move { Router::clone(&table).oneshot(request).await }
        });
        let front = Router::new()
            .fallback_service(dispatch)
            .layer(TraceLayer::new_for_http());

        if self.front.set(front).is_err() {
            tracing::debug!("Web surface already initialized");
        } else {
            tracing::info!("Web surface initialized");
        }
    }

    fn configure_secure_transport(&self, keystore: &Path, passphrase: &str) {
        self.lock_settings().keystore = Some(Keystore {
            path: keystore.to_path_buf(),
            passphrase: passphrase.to_string(),
        });
    }

    fn set_listen_address(&self, address: IpAddr) {
        self.lock_settings().address = address;
    }

    fn set_listen_port(&self, port: u16) {
        self.lock_settings().port = port;
    }

    fn set_static_asset_root(&self, root: &Path) {
        self.lock_settings().static_root = Some(root.to_path_buf());
    }

    fn install_failure_handler(&self, handler: FailureHandler) {
        self.lock_settings().failure_handler = Some(handler);
    }

    fn add_routes(&self, routes: Router) {
        self.routes
            .rcu(|table| Router::clone(table).merge(routes.clone()));
    }

    fn start(&self) {
        let settings = self.lock_settings().clone();

        let Some(front) = self.front.get().cloned() else {
            report_failure(&settings, ListenerError::NotInitialized);
            self.ready.send_replace(Readiness::Failed);
            return;
        };

        if let Some(root) = &settings.static_root {
            let assets = ServeDir::new(root);
            self.routes
                .rcu(|table| Router::clone(table).fallback_service(assets.clone()));
        }

        self.ready.send_replace(Readiness::Pending);
        let handle = Handle::new();
        let task = tokio::spawn(serve_listener(
            settings,
            front,
            handle.clone(),
            Arc::clone(&self.ready),
        ));
        *self.lock_running() = Some(RunningListener { handle, task });
    }

    async fn await_route_registration(&self) -> Option<SocketAddr> {
        let mut ready = self.ready.subscribe();
        let state = ready
            .wait_for(|state| *state != Readiness::Pending)
            .await
            .ok()
            .map(|state| *state)?;

        match state {
            Readiness::Listening(addr) => Some(addr),
            _ => None,
        }
    }

    async fn stop(&self) {
        let running = self.lock_running().take();
        if let Some(RunningListener { handle, task }) = running {
            handle.graceful_shutdown(Some(STOP_GRACE));
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Web listener task ended abnormally");
            }
        }

        self.routes.store(Arc::new(Router::new()));
        {
            let mut settings = self.lock_settings();
            settings.keystore = None;
            settings.static_root = None;
            settings.failure_handler = None;
        }
        self.ready.send_replace(Readiness::Idle);
        tracing::info!("Web surface stopped");
    }
}

/// Bind and serve until the handle shuts the listener down.
async fn serve_listener(
    settings: ListenerSettings,
    app: Router,
    handle: Handle,
    ready: Arc<watch::Sender<Readiness>>,
) {
    let addr = SocketAddr::new(settings.address, settings.port);

    let announce = {
        let handle = handle.clone();
        let ready = Arc::clone(&ready);
        tokio::spawn(async move {
            if let Some(bound) = handle.listening().await {
                ready.send_replace(Readiness::Listening(bound));
                tracing::info!(address = %bound, "Web listener ready");
            }
        })
    };

    let service = app.into_make_service();
    let result = match &settings.keystore {
        Some(keystore) => match tls::load_keystore(&keystore.path, &keystore.passphrase) {
            Ok(tls_config) => axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(service)
                .await
                .map_err(|source| ListenerError::ListenerBindFailed { addr, source }),
            Err(e) => Err(e),
        },
        None => axum_server::bind(addr)
            .handle(handle)
            .serve(service)
            .await
            .map_err(|source| ListenerError::ListenerBindFailed { addr, source }),
    };

    match result {
        Ok(()) => tracing::info!(address = %addr, "Web listener stopped"),
        Err(err) => {
            announce.abort();
            tracing::error!(address = %addr, error = %err, "Web listener failed to start");
            // Recovery acts before the readiness barrier releases.
            report_failure(&settings, err);
            ready.send_replace(Readiness::Failed);
        }
    }
}

fn report_failure(settings: &ListenerSettings, err: ListenerError) {
    match &settings.failure_handler {
        Some(handler) => handler(err),
        None => tracing::warn!(error = %err, "No failure handler installed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn loopback(surface: &HttpSurface) {
        surface.set_listen_address(IpAddr::V4(Ipv4Addr::LOCALHOST));
        surface.set_listen_port(0);
    }

    #[tokio::test]
    async fn serves_routes_added_before_and_after_start() {
        let surface = HttpSurface::new();
        surface.init();
        loopback(&surface);
        surface.add_routes(Router::new().route("/early", get(|| async { "early" })));
        surface.start();

        let addr = surface.await_route_registration().await.expect("listener up");
        surface.add_routes(Router::new().route("/late", get(|| async { "late" })));

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let early = client.get(format!("http://{addr}/early")).send().await.unwrap();
        assert_eq!(early.text().await.unwrap(), "early");
        let late = client.get(format!("http://{addr}/late")).send().await.unwrap();
        assert_eq!(late.text().await.unwrap(), "late");

        surface.stop().await;
        assert!(surface.await_route_registration().await.is_none());
    }

    #[tokio::test]
    async fn missing_keystore_goes_to_failure_handler() {
        let surface = HttpSurface::new();
        surface.init();
        loopback(&surface);
        surface.configure_secure_transport(Path::new("/nonexistent/keystore.pem"), "");

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        surface.install_failure_handler(Arc::new(move |err: ListenerError| {
            let _ = tx.send(err.is_key_store());
        }));
        surface.start();

        assert!(surface.await_route_registration().await.is_none());
        assert_eq!(rx.recv().await, Some(true));
        surface.stop().await;
    }

    #[tokio::test]
    async fn port_in_use_is_a_bind_failure() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let surface = HttpSurface::new();
        surface.init();
        surface.set_listen_address(IpAddr::V4(Ipv4Addr::LOCALHOST));
        surface.set_listen_port(port);

        let binds = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&binds);
        surface.install_failure_handler(Arc::new(move |err: ListenerError| {
            if matches!(err, ListenerError::ListenerBindFailed { .. }) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        }));
        surface.start();

        assert!(surface.await_route_registration().await.is_none());
        surface.stop().await;
        assert_eq!(binds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_before_init_fails() {
        let surface = HttpSurface::new();
        surface.start();
        assert!(surface.await_route_registration().await.is_none());
    }
}
