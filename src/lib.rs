//! HA Bridge: a discoverable smart-home hub emulator and its process
//! supervisor.

pub mod config;
pub mod devices;
pub mod discovery;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod system;

pub use config::{BridgeConfig, SettingsStore};
pub use http::HttpSurface;
pub use lifecycle::{ExitReason, ExitReport, Supervisor};
