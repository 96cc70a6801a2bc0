//! The process supervisor.
//!
//! # Responsibilities
//! - Drive one retryable lifecycle per iteration: configure, start listeners,
//!   run the discovery responder, tear down
//! - Own the control flags and the termination hook registration
//! - Leave through one exit path that purges test credentials, persists
//!   settings and drains the outbound pool
//!
//! # Design Decisions
//! - The responder's listen loop is the only blocking point of an iteration
//! - Collaborators are trait objects so tests drive the loop with fakes
//! - No collaborator failure propagates out of `run`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::watcher::ConfigWatcher;
use crate::config::{BridgeConfig, SettingsStore};
use crate::devices::{emulation, HomeBuilder, HomeManager};
use crate::discovery::{DiscoveryListener, DiscoveryService, DiscoverySettingsResource, SsdpDiscovery};
use crate::http::{HttpSurface, WebSurface};
use crate::lifecycle::control::{ControlFlags, ListenOutcome};
use crate::lifecycle::recovery::FailureRouter;
use crate::lifecycle::shutdown::{ShutdownHook, ShutdownRegistry};
use crate::lifecycle::signals::spawn_signal_listener;
use crate::lifecycle::startup::RunContext;
use crate::lifecycle::state::SupervisorState;
use crate::net::{DatagramBootstrap, HttpClientPool, UdpBootstrap};
use crate::observability::metrics;
use crate::resilience::{BackoffOutcome, RestartBackoff};
use crate::system::SystemControl;

/// Why the supervisor left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A stop was requested (signal, system API, or key-store recovery).
    Stopped,
    /// The discovery response socket could not be opened.
    DatagramUnavailable,
    /// The discovery responder could not be started.
    DiscoveryUnavailable,
}

/// Summary of a supervisor run. The process exits 0 whatever the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub iterations: u64,
    pub reason: ExitReason,
}

pub struct Supervisor {
    store: Arc<SettingsStore>,
    control: Arc<ControlFlags>,
    surface: Arc<dyn WebSurface>,
    datagram: Arc<dyn DatagramBootstrap>,
    homes: Arc<dyn HomeBuilder>,
    discovery: Arc<dyn DiscoveryService>,
    registry: Arc<ShutdownRegistry>,
    pool: HttpClientPool,
    backoff: Option<Duration>,
    handle_signals: bool,
    state: Arc<watch::Sender<SupervisorState>>,
}

impl Supervisor {
    pub fn builder(store: Arc<SettingsStore>) -> SupervisorBuilder {
        SupervisorBuilder::new(store)
    }

    pub fn control(&self) -> Arc<ControlFlags> {
        Arc::clone(&self.control)
    }

    pub fn registry(&self) -> Arc<ShutdownRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Run until a stop is requested or a fatal startup failure occurs.
    pub async fn run(&self) -> ExitReport {
        let signals = self
            .handle_signals
            .then(|| spawn_signal_listener(self.registry(), self.control()));
        let _watcher = self.watch_settings();

        tracing::info!(version = env!("CARGO_PKG_VERSION"), "HA Bridge starting");

        let mut iterations = 0;
        let mut reason = ExitReason::Stopped;
        while !self.control.is_stop() {
            iterations += 1;
            metrics::record_iteration(iterations);

            let (system, config) = self.configure(iterations);
            let mut context = RunContext::new(system);

            match self.start_listeners(&mut context, &config).await {
                Ok(listener) => {
                    self.set_state(SupervisorState::Running);
                    match listener.listen().await {
                        ListenOutcome::Stopped => self.control.request_stop(),
                        ListenOutcome::ReinitRequested => {
                            tracing::info!(iteration = iterations, "Reinitializing with fresh settings");
                            metrics::record_reinit();
                        }
                    }
                }
                Err(fatal) => reason = fatal,
            }

            self.set_state(SupervisorState::TearingDown);
            context
                .teardown(self.homes.as_ref(), self.datagram.as_ref())
                .await;
            self.surface.stop().await;
            self.set_state(SupervisorState::Stopped);

            if !self.control.is_stop() {
                let delay = self
                    .backoff
                    .unwrap_or_else(|| Duration::from_secs(config.control.backoff_secs));
                tracing::info!(delay = ?delay, "Restarting after back-off");
                if RestartBackoff::fixed(delay).wait(&self.control).await == BackoffOutcome::Interrupted {
                    tracing::warn!("Back-off interrupted by stop request");
                }
            }
        }

        self.exit(iterations, reason, signals).await
    }

    /// CONFIGURING: reload settings and prepare the web surface.
    fn configure(&self, iteration: u64) -> (SystemControl, Arc<BridgeConfig>) {
        self.set_state(SupervisorState::Configuring);

        let config = self.store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not reload settings, keeping previous ones");
            self.store.snapshot()
        });

        let security = &config.security;
        if security.use_https {
            match &security.keystore_path {
                Some(path) => self
                    .surface
                    .configure_secure_transport(path, &security.keystore_password),
                None => tracing::warn!("HTTPS enabled without a keystore path, serving plain HTTP"),
            }
        }
        self.store.remove_test_users();

        let network = &config.network;
        self.surface.set_listen_address(network.web_address);
        self.surface.set_listen_port(network.server_port);
        self.surface.set_static_asset_root(&config.http.static_root);

        let system = SystemControl::new(Arc::clone(&self.store), self.control(), iteration);
        let router = FailureRouter::new(system.clone(), network.server_port, Arc::clone(&self.state));
        self.surface.install_failure_handler(router.into_handler());

        // A pending reinit is satisfied by this reload.
        if self.control.take_reinit() {
            tracing::debug!(iteration, "Reinit request consumed");
        }
        if iteration == 1 {
            self.surface.init();
        }

        tracing::info!(
            iteration,
            address = %network.web_address,
            port = network.server_port,
            https = security.use_https,
            "Configured"
        );
        (system, config)
    }

    /// STARTING_LISTENERS: open the socket, build devices, start the web
    /// listener and the discovery responder.
    async fn start_listeners(
        &self,
        context: &mut RunContext,
        config: &BridgeConfig,
    ) -> Result<Box<dyn DiscoveryListener>, ExitReason> {
        self.set_state(SupervisorState::StartingListeners);
        let network = &config.network;

        self.surface.add_routes(context.system().routes());
        self.registry
            .replace(ShutdownHook::new(context.system().clone()));

        let socket = match self.datagram.open(network.upnp_response_port).await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(error = %e, "Discovery response socket unavailable, stopping");
                self.control.request_stop();
                return Err(ExitReason::DatagramUnavailable);
            }
        };
        context.set_socket(socket.clone());

        let homes = self.homes.build(config, &socket).await;
        context.set_homes(homes.clone());
        self.surface
            .add_routes(emulation::routes(homes, Arc::clone(&self.store)));

        self.surface.start();
        match self.surface.await_route_registration().await {
            Some(addr) => tracing::info!(address = %addr, "HA Bridge web service ready"),
            None => tracing::warn!("Web listener did not come up; recovery decides what happens next"),
        }

        if network.trace_upnp {
            tracing::info!(
                interface = %network.upnp_config_address,
                use_interface = network.use_upnp_iface,
                response_port = network.upnp_response_port,
                "Discovery tracing enabled"
            );
        }

        DiscoverySettingsResource::start(network, self.surface.as_ref());
        match self.discovery.start(network, self.control(), socket).await {
            Ok(listener) => Ok(listener),
            Err(e) => {
                tracing::error!(error = %e, "Discovery responder failed to start, stopping");
                self.control.request_stop();
                Err(ExitReason::DiscoveryUnavailable)
            }
        }
    }

    async fn exit(
        &self,
        iterations: u64,
        reason: ExitReason,
        signals: Option<tokio::task::JoinHandle<()>>,
    ) -> ExitReport {
        self.registry.deregister();
        self.store.remove_test_users();
        if let Err(e) = self.store.persist_if_changed() {
            tracing::warn!(error = %e, "Could not persist settings at exit");
        }

        let bound = Duration::from_secs(self.store.snapshot().http.pool_shutdown_secs);
        if let Err(e) = self.pool.shutdown(bound).await {
            tracing::warn!(error = %e, "Error shutting down http pool");
        }
        if let Some(signals) = signals {
            signals.abort();
        }

        tracing::info!(
            iterations,
            reason = ?reason,
            "HA Bridge (v{}) exiting....",
            env!("CARGO_PKG_VERSION")
        );
        ExitReport { iterations, reason }
    }

    fn watch_settings(&self) -> Option<notify::RecommendedWatcher> {
        if !self.store.snapshot().control.watch_settings {
            return None;
        }
        match ConfigWatcher::new(Arc::clone(&self.store), self.control()).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Settings watcher unavailable");
                None
            }
        }
    }

    fn set_state(&self, state: SupervisorState) {
        self.state.send_replace(state);
        metrics::record_state(state);
        tracing::debug!(state = %state, "Supervisor state");
    }
}

/// Assembles a [`Supervisor`], defaulting every collaborator.
pub struct SupervisorBuilder {
    store: Arc<SettingsStore>,
    surface: Option<Arc<dyn WebSurface>>,
    datagram: Option<Arc<dyn DatagramBootstrap>>,
    homes: Option<Arc<dyn HomeBuilder>>,
    discovery: Option<Arc<dyn DiscoveryService>>,
    pool: Option<HttpClientPool>,
    backoff: Option<Duration>,
    handle_signals: bool,
}

impl SupervisorBuilder {
    pub fn new(store: Arc<SettingsStore>) -> Self {
        Self {
            store,
            surface: None,
            datagram: None,
            homes: None,
            discovery: None,
            pool: None,
            backoff: None,
            handle_signals: true,
        }
    }

    pub fn with_surface(mut self, surface: Arc<dyn WebSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_datagram(mut self, datagram: Arc<dyn DatagramBootstrap>) -> Self {
        self.datagram = Some(datagram);
        self
    }

    pub fn with_homes(mut self, homes: Arc<dyn HomeBuilder>) -> Self {
        self.homes = Some(homes);
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn DiscoveryService>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_pool(mut self, pool: HttpClientPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Override the configured back-off delay.
    pub fn with_backoff(mut self, delay: Duration) -> Self {
        self.backoff = Some(delay);
        self
    }

    /// Leave OS signals alone; callers drive the registry themselves.
    pub fn without_signal_handling(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    pub fn build(self) -> Supervisor {
        let config = self.store.snapshot();
        let pool = self.pool.unwrap_or_else(|| {
            HttpClientPool::new(Duration::from_secs(config.http.request_timeout_secs))
        });
        let homes = self
            .homes
            .unwrap_or_else(|| Arc::new(HomeManager::new(pool.clone())));
        let (state, _) = watch::channel(SupervisorState::Stopped);

        Supervisor {
            control: Arc::new(ControlFlags::new()),
            surface: self.surface.unwrap_or_else(|| Arc::new(HttpSurface::new())),
            datagram: self
                .datagram
                .unwrap_or_else(|| Arc::new(UdpBootstrap::default())),
            homes,
            discovery: self
                .discovery
                .unwrap_or_else(|| Arc::new(SsdpDiscovery::default())),
            registry: Arc::new(ShutdownRegistry::new()),
            pool,
            backoff: self.backoff,
            handle_signals: self.handle_signals,
            state: Arc::new(state),
            store: self.store,
        }
    }
}
