//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! supervisor.rs
//!     loop while !stop:
//!         configure → start listeners → listen → teardown → back-off
//!     exit: purge test users → persist → drain pool
//!
//! control.rs    stop/reinit flags, the loop's only steering signal
//! recovery.rs   listener failures (own task) → flags / settings
//! shutdown.rs   termination hook bound to the current run
//! signals.rs    SIGINT/SIGTERM/SIGQUIT → fire the hook
//! startup.rs    RunContext, the resources of one run
//! ```

pub mod control;
pub mod recovery;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;
pub mod supervisor;

pub use control::{ControlFlags, ListenOutcome};
pub use state::SupervisorState;
pub use supervisor::{ExitReason, ExitReport, Supervisor, SupervisorBuilder};
