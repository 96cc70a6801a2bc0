//! Outbound connection pool for backend device requests.
//!
//! # Responsibilities
//! - Share one `reqwest` client across every device request
//! - Track in-flight requests
//! - Drain with a bounded wait at process exit

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::net::connection::RequestTracker;

/// Error type for outbound pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("outbound request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0} outbound requests still in flight after {1:?}")]
    Timeout(u64, Duration),

    #[error("outbound pool is shut down")]
    Closed,
}

/// Shared outbound HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientPool {
    client: reqwest::Client,
    tracker: RequestTracker,
    closed: Arc<AtomicBool>,
}

impl HttpClientPool {
    pub fn new(request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .no_proxy()
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default outbound client");
                reqwest::Client::new()
            });

        Self {
            client,
            tracker: RequestTracker::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Issue a GET against a device URL and return its status.
    pub async fn get(&self, url: &Url) -> Result<StatusCode, PoolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let guard = self.tracker.track();
        tracing::debug!(request_id = %guard.id(), url = %url, "Outbound device request");
        let response = self.client.get(url.clone()).send().await?;
        Ok(response.status())
    }

    pub fn in_flight(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Refuse new requests and wait up to `bound` for in-flight ones.
    pub async fn shutdown(&self, bound: Duration) -> Result<(), PoolError> {
        self.closed.store(true, Ordering::SeqCst);

        match tokio::time::timeout(bound, self.tracker.wait_idle()).await {
            Ok(()) => {
                tracing::info!("Outbound pool drained");
                Ok(())
            }
            Err(_) => Err(PoolError::Timeout(self.in_flight(), bound)),
        }
    }
}

impl Default for HttpClientPool {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
