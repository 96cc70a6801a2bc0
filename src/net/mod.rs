//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! tls.rs        PEM key store → rustls server config for the web surface
//! udp.rs        discovery response socket (open per run, closed at teardown)
//! pool.rs       shared outbound client for device requests
//!     → connection.rs (in-flight tracking, drained at exit)
//! ```

pub mod connection;
pub mod pool;
pub mod tls;
pub mod udp;

pub use pool::{HttpClientPool, PoolError};
pub use udp::{DatagramBootstrap, DatagramError, ResponseSocket, UdpBootstrap};
