//! Discovery subsystem.
//!
//! # Data Flow
//! ```text
//! M-SEARCH on 239.255.255.250:1900
//!     → responder.rs (listen loop, observes ControlFlags)
//!     → reply sent from the run's response socket
//!     → controller fetches /description.xml (settings.rs)
//! ```

pub mod responder;
pub mod settings;

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::NetworkConfig;
use crate::lifecycle::control::{ControlFlags, ListenOutcome};
use crate::net::ResponseSocket;

pub use responder::SsdpDiscovery;
pub use settings::DiscoverySettingsResource;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("could not open discovery socket on port {port}: {source}")]
    Socket {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("could not join multicast group on {interface}: {source}")]
    Multicast {
        interface: std::net::Ipv4Addr,
        #[source]
        source: io::Error,
    },
}

/// Starts the discovery responder for one run.
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    async fn start(
        &self,
        network: &NetworkConfig,
        control: Arc<ControlFlags>,
        socket: ResponseSocket,
    ) -> Result<Box<dyn DiscoveryListener>, DiscoveryError>;
}

/// A started responder.
#[async_trait]
pub trait DiscoveryListener: Send {
    /// Serve requests until a stop or reinit is requested.
    async fn listen(self: Box<Self>) -> ListenOutcome;
}
