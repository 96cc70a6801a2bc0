//! Resilience subsystem.
//!
//! # Design Decisions
//! - Restarts wait a fixed delay; no exponential growth or jitter
//! - The wait is cancellable by a stop request, never by a reinit

pub mod backoff;

pub use backoff::{BackoffOutcome, RestartBackoff};
