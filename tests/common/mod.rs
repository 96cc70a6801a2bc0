//! Fake collaborators for driving the supervisor in tests.
//!
//! Every fake appends to one shared `EventLog`, so tests can assert on the
//! order in which the supervisor touched its collaborators.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;

use ha_bridge::config::loader::save_config;
use ha_bridge::config::{BridgeConfig, NetworkConfig, SettingsStore};
use ha_bridge::devices::{HomeBuilder, HomeSet};
use ha_bridge::discovery::{DiscoveryError, DiscoveryListener, DiscoveryService};
use ha_bridge::http::{FailureHandler, ListenerError, WebSurface};
use ha_bridge::lifecycle::control::{ControlFlags, ListenOutcome};
use ha_bridge::net::{DatagramBootstrap, DatagramError, HttpClientPool, ResponseSocket};

/// Ordered record of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.count(event) > 0
    }

    /// Positions of every occurrence of `event`.
    pub fn positions(&self, event: &str) -> Vec<usize> {
        self.events()
            .iter()
            .enumerate()
            .filter(|(_, e)| *e == event)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Write `config` to a fresh settings file and open a store on it.
pub fn store_with(dir: &tempfile::TempDir, config: &BridgeConfig) -> Arc<SettingsStore> {
    let path = dir.path().join("habridge.toml");
    save_config(&path, config).unwrap();
    Arc::new(SettingsStore::open(path).unwrap())
}

/// Settings that bind nothing outside loopback.
pub fn loopback_config() -> BridgeConfig {
    BridgeConfig {
        network: NetworkConfig {
            web_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            server_port: 0,
            upnp_response_port: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn rewrite_address(path: &Path, address: IpAddr) {
    let mut config = ha_bridge::config::loader::load_config(path).unwrap();
    config.network.web_address = address;
    save_config(path, &config).unwrap();
}

pub fn rewrite_port(path: &Path, port: u16) {
    let mut config = ha_bridge::config::loader::load_config(path).unwrap();
    config.network.server_port = port;
    save_config(path, &config).unwrap();
}

/// Web surface that records calls instead of binding.
pub struct FakeSurface {
    log: EventLog,
    keystore: Mutex<Option<PathBuf>>,
    handler: Mutex<Option<FailureHandler>>,
    port: AtomicUsize,
    listening: AtomicBool,
    bind_failures: AtomicUsize,
}

impl FakeSurface {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            keystore: Mutex::new(None),
            handler: Mutex::new(None),
            port: AtomicUsize::new(0),
            listening: AtomicBool::new(false),
            bind_failures: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` starts with a bind error.
    pub fn failing_binds(self, count: usize) -> Self {
        self.bind_failures.store(count, Ordering::SeqCst);
        self
    }

    fn fail(&self, err: ListenerError) {
        self.log.push("surface.failure");
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }
}

#[async_trait]
impl WebSurface for FakeSurface {
    fn init(&self) {
        self.log.push("surface.init");
    }

    fn configure_secure_transport(&self, keystore: &Path, _passphrase: &str) {
        self.log.push("surface.tls");
        *self.keystore.lock().unwrap() = Some(keystore.to_path_buf());
    }

    fn set_listen_address(&self, _address: IpAddr) {
        self.log.push("surface.set_listen_address");
    }

    fn set_listen_port(&self, port: u16) {
        self.log.push(format!("surface.set_listen_port:{port}"));
        self.port.store(port as usize, Ordering::SeqCst);
    }

    fn set_static_asset_root(&self, _root: &Path) {
        self.log.push("surface.set_static_asset_root");
    }

    fn install_failure_handler(&self, handler: FailureHandler) {
        self.log.push("surface.install_failure_handler");
        *self.handler.lock().unwrap() = Some(handler);
    }

    fn add_routes(&self, _routes: Router) {
        self.log.push("surface.add_routes");
    }

    fn start(&self) {
        self.log.push("surface.start");
        let keystore = self.keystore.lock().unwrap().clone();
        if let Some(path) = keystore {
            self.fail(ListenerError::KeyStoreInvalid {
                path,
                reason: "file not found".to_string(),
            });
            return;
        }

        let pending = self.bind_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.bind_failures.store(pending - 1, Ordering::SeqCst);
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.port.load(Ordering::SeqCst) as u16);
            self.fail(ListenerError::ListenerBindFailed {
                addr,
                source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
            });
            return;
        }
        self.listening.store(true, Ordering::SeqCst);
    }

    async fn await_route_registration(&self) -> Option<SocketAddr> {
        self.log.push("surface.await_route_registration");
        self.listening.load(Ordering::SeqCst).then(|| {
            SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                self.port.load(Ordering::SeqCst) as u16,
            )
        })
    }

    async fn stop(&self) {
        self.log.push("surface.stop");
        self.listening.store(false, Ordering::SeqCst);
        *self.keystore.lock().unwrap() = None;
        *self.handler.lock().unwrap() = None;
    }
}

/// Datagram bootstrap binding loopback sockets, optionally failing.
pub struct FakeDatagram {
    log: EventLog,
    fail: bool,
}

impl FakeDatagram {
    pub fn new(log: EventLog) -> Self {
        Self { log, fail: false }
    }

    pub fn failing(log: EventLog) -> Self {
        Self { log, fail: true }
    }
}

#[async_trait]
impl DatagramBootstrap for FakeDatagram {
    async fn open(&self, port: u16) -> Result<ResponseSocket, DatagramError> {
        self.log.push("datagram.open");
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        if self.fail {
            return Err(DatagramError::Bind {
                addr,
                source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
            });
        }
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Ok(ResponseSocket::new(socket).unwrap())
    }

    async fn close(&self, _socket: ResponseSocket) {
        self.log.push("datagram.close");
    }
}

/// Device manager that records build and close.
pub struct FakeHomes {
    log: EventLog,
}

impl FakeHomes {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl HomeBuilder for FakeHomes {
    async fn build(&self, config: &BridgeConfig, _socket: &ResponseSocket) -> HomeSet {
        self.log.push("homes.build");
        HomeSet::new(&config.devices, HttpClientPool::default())
    }

    async fn close_all(&self, homes: HomeSet) {
        self.log.push("homes.close_all");
        homes.close();
    }
}

/// Action run by a fake responder when its listen loop starts.
pub type ListenStep = Box<dyn FnOnce(&ControlFlags) + Send>;

/// Discovery responder driven by a script of listen steps.
///
/// Each `listen` pops one step, runs it, then blocks until a stop or reinit
/// is requested. With no step left it simply blocks.
pub struct FakeDiscovery {
    log: EventLog,
    fail: bool,
    steps: Arc<Mutex<VecDeque<ListenStep>>>,
}

impl FakeDiscovery {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            fail: false,
            steps: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn failing(log: EventLog) -> Self {
        Self {
            fail: true,
            ..Self::new(log)
        }
    }

    pub fn then(self, step: impl FnOnce(&ControlFlags) + Send + 'static) -> Self {
        self.steps.lock().unwrap().push_back(Box::new(step));
        self
    }
}

#[async_trait]
impl DiscoveryService for FakeDiscovery {
    async fn start(
        &self,
        _network: &NetworkConfig,
        control: Arc<ControlFlags>,
        _socket: ResponseSocket,
    ) -> Result<Box<dyn DiscoveryListener>, DiscoveryError> {
        self.log.push("discovery.start");
        if self.fail {
            return Err(DiscoveryError::Socket {
                port: 1900,
                source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
            });
        }
        let step = self.steps.lock().unwrap().pop_front();
        Ok(Box::new(FakeListener {
            log: self.log.clone(),
            control,
            step,
        }))
    }
}

struct FakeListener {
    log: EventLog,
    control: Arc<ControlFlags>,
    step: Option<ListenStep>,
}

#[async_trait]
impl DiscoveryListener for FakeListener {
    async fn listen(self: Box<Self>) -> ListenOutcome {
        self.log.push("discovery.listen");
        let FakeListener { log, control, step } = *self;
        if let Some(step) = step {
            step(&control);
        }
        let outcome = control.wait_for_request().await;
        log.push(format!("discovery.return:{outcome:?}"));
        outcome
    }
}
