//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! supervisor (per iteration)
//!     → surface.rs (address, port, TLS key store, static assets, failure handler)
//!     → collaborators add routes (system control, emulation API, discovery settings)
//!     → surface.rs start (listener task) → readiness barrier
//!     → failures → error.rs (structured ListenerError) → failure handler
//! ```

pub mod error;
pub mod surface;

pub use error::ListenerError;
pub use surface::{FailureHandler, HttpSurface, WebSurface};
