//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → store.rs (current snapshot + changed flag)
//!     → snapshotted by the supervisor at the top of every iteration
//!
//! On external edit (optional):
//!     watcher.rs detects change
//!     → loader.rs parses the new file
//!     → differs from the current snapshot → reinit requested
//!     → supervisor reloads on its next iteration
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal settings files
//! - Validation separates syntactic (serde) from semantic checks
//! - Persisting is explicit; edits only mark the store changed

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{
    BridgeConfig, ControlConfig, DeviceConfig, HttpConfig, NetworkConfig, ObservabilityConfig,
    SecurityConfig, WhitelistEntry,
};
pub use store::SettingsStore;
