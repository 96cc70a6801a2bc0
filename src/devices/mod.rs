//! Backend device connections.
//!
//! # Responsibilities
//! - Build the set of configured devices for one run
//! - Switch devices through the shared outbound pool
//! - Close every device connection at teardown

pub mod emulation;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::config::{BridgeConfig, DeviceConfig};
use crate::net::{HttpClientPool, PoolError, ResponseSocket};

#[derive(Debug, Error)]
pub enum HomeError {
    #[error("light {0} not available")]
    UnknownLight(String),

    #[error("device connections are closed")]
    Closed,

    #[error(transparent)]
    Request(#[from] PoolError),

    #[error("device {id} answered {status}")]
    Status { id: String, status: StatusCode },
}

/// Last known state of a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightState {
    pub on: bool,
    pub reachable: bool,
}

/// A configured backend device exposed as a light.
#[derive(Debug, Clone)]
pub struct Light {
    pub config: DeviceConfig,
    pub state: LightState,
}

/// Device connections for one supervisor iteration.
#[derive(Debug, Clone)]
pub struct HomeSet {
    lights: Arc<DashMap<String, Light>>,
    pool: HttpClientPool,
    closed: Arc<AtomicBool>,
}

impl HomeSet {
    pub fn new(devices: &[DeviceConfig], pool: HttpClientPool) -> Self {
        let lights = DashMap::new();
        for device in devices {
            let light = Light {
                config: device.clone(),
                state: LightState {
                    on: false,
                    reachable: true,
                },
            };
            lights.insert(device.id.clone(), light);
        }

        Self {
            lights: Arc::new(lights),
            pool,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn light(&self, id: &str) -> Option<Light> {
        self.lights.get(id).map(|entry| entry.value().clone())
    }

    /// Every light, ordered by id.
    pub fn lights(&self) -> Vec<Light> {
        let mut lights: Vec<Light> = self
            .lights
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        lights.sort_by(|a, b| a.config.id.cmp(&b.config.id));
        lights
    }

    /// Switch a light, calling its device URL when one is configured.
    pub async fn set_on(&self, id: &str, on: bool) -> Result<LightState, HomeError> {
        if self.is_closed() {
            return Err(HomeError::Closed);
        }

        let url = {
            let light = self
                .lights
                .get(id)
                .ok_or_else(|| HomeError::UnknownLight(id.to_string()))?;
            if on {
                light.config.on_url.clone()
            } else {
                light.config.off_url.clone()
            }
        };

        let reachable = match url {
            Some(url) => match self.pool.get(&url).await {
                Ok(status) if status.is_success() => true,
                Ok(status) => {
                    self.mark_unreachable(id);
                    return Err(HomeError::Status {
                        id: id.to_string(),
                        status,
                    });
                }
                Err(e) => {
                    self.mark_unreachable(id);
                    return Err(e.into());
                }
            },
            None => true,
        };

        let mut light = self
            .lights
            .get_mut(id)
            .ok_or_else(|| HomeError::UnknownLight(id.to_string()))?;
        light.state = LightState { on, reachable };
        tracing::debug!(light = %id, on, "Light switched");
        Ok(light.state)
    }

    /// Refuse further requests and drop the device set.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let count = self.lights.len();
            self.lights.clear();
            tracing::info!(devices = count, "Device connections closed");
        }
    }

    fn mark_unreachable(&self, id: &str) {
        if let Some(mut light) = self.lights.get_mut(id) {
            light.state.reachable = false;
        }
    }
}

/// Builds and tears down device connections for a run.
#[async_trait]
pub trait HomeBuilder: Send + Sync {
    async fn build(&self, config: &BridgeConfig, socket: &ResponseSocket) -> HomeSet;

    async fn close_all(&self, homes: HomeSet);
}

/// Device manager backed by the shared outbound pool.
#[derive(Debug, Clone)]
pub struct HomeManager {
    pool: HttpClientPool,
}

impl HomeManager {
    pub fn new(pool: HttpClientPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HomeBuilder for HomeManager {
    async fn build(&self, config: &BridgeConfig, socket: &ResponseSocket) -> HomeSet {
        let homes = HomeSet::new(&config.devices, self.pool.clone());
        tracing::info!(
            devices = homes.len(),
            response_port = socket.port(),
            "Device connections built"
        );
        homes
    }

    async fn close_all(&self, homes: HomeSet) {
        homes.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::AtomicUsize;
    use url::Url;

    fn device(id: &str, on_url: Option<Url>) -> DeviceConfig {
        DeviceConfig {
            id: id.to_string(),
            name: format!("Lamp {id}"),
            on_url,
            off_url: None,
        }
    }

    #[tokio::test]
    async fn virtual_light_switches_without_request() {
        let homes = HomeSet::new(&[device("1", None)], HttpClientPool::default());

        let state = homes.set_on("1", true).await.unwrap();
        assert!(state.on);
        assert!(homes.light("1").unwrap().state.on);
    }

    #[tokio::test]
    async fn unknown_light_is_reported() {
        let homes = HomeSet::new(&[], HttpClientPool::default());
        assert!(matches!(
            homes.set_on("9", true).await,
            Err(HomeError::UnknownLight(_))
        ));
    }

    #[tokio::test]
    async fn device_url_is_requested() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/on",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { "ok" }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let url = Url::parse(&format!("http://{addr}/on")).unwrap();
        let homes = HomeSet::new(&[device("1", Some(url))], HttpClientPool::default());

        homes.set_on("1", true).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_set_refuses_requests() {
        let homes = HomeSet::new(&[device("1", None)], HttpClientPool::default());
        homes.close();
        homes.close();

        assert!(homes.is_empty());
        assert!(matches!(
            homes.set_on("1", true).await,
            Err(HomeError::Closed)
        ));
    }
}
