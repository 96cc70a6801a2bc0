//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! supervisor, recovery, discovery
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and the supervisor state gauge)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape (optional)
//! ```

pub mod logging;
pub mod metrics;
