//! In-flight request tracking for the outbound pool.
//!
//! # Responsibilities
//! - Count requests currently in flight
//! - Release the count when a request finishes, even on early return
//! - Let shutdown wait until nothing is in flight

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Global atomic counter for request IDs.
/// Relaxed ordering is sufficient since we only need uniqueness.
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        Self(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Tracks in-flight requests.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    active: Arc<AtomicU64>,
    idle: Arc<Notify>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new in-flight request. The guard releases it on drop.
    pub fn track(&self) -> RequestGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        RequestGuard {
            active: Arc::clone(&self.active),
            idle: Arc::clone(&self.idle),
            id: RequestId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until no request is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if self.active_count() == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// Guard for one in-flight request.
#[derive(Debug)]
pub struct RequestGuard {
    active: Arc<AtomicU64>,
    idle: Arc<Notify>,
    id: RequestId,
}

impl RequestGuard {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
        tracing::trace!(request_id = %self.id, "Outbound request finished");
    }
}
