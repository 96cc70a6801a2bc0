//! Datagram responder bootstrap.
//!
//! # Responsibilities
//! - Bind the UDP socket used to answer discovery requests
//! - Share it between the discovery responder and the emulation layer
//! - Release it at teardown
//!
//! # Design Decisions
//! - A bind failure is reported, never retried here; the supervisor treats it
//!   as fatal for the run

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;

/// Error type for datagram socket operations.
#[derive(Debug, Error)]
pub enum DatagramError {
    #[error("could not bind discovery response socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// The bound discovery response socket.
#[derive(Debug, Clone)]
pub struct ResponseSocket {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

impl ResponseSocket {
    pub fn new(socket: UdpSocket) -> io::Result<Self> {
        let local_addr = socket.local_addr()?;
        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Send a datagram to `target`.
    pub async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(payload, target).await
    }

    /// Number of live handles to the socket, this one included.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.socket)
    }
}

/// Opens and closes the discovery response socket.
#[async_trait]
pub trait DatagramBootstrap: Send + Sync {
    async fn open(&self, port: u16) -> Result<ResponseSocket, DatagramError>;

    async fn close(&self, socket: ResponseSocket);
}

/// Binds the response socket with tokio.
#[derive(Debug, Clone)]
pub struct UdpBootstrap {
    bind_address: IpAddr,
}

impl UdpBootstrap {
    pub fn new(bind_address: IpAddr) -> Self {
        Self { bind_address }
    }
}

impl Default for UdpBootstrap {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

#[async_trait]
impl DatagramBootstrap for UdpBootstrap {
    async fn open(&self, port: u16) -> Result<ResponseSocket, DatagramError> {
        let addr = SocketAddr::new(self.bind_address, port);
        let socket = UdpSocket::bind(addr)
            .await
            .and_then(ResponseSocket::new)
            .map_err(|source| DatagramError::Bind { addr, source })?;

        tracing::info!(address = %socket.local_addr(), "Discovery response socket open");
        Ok(socket)
    }

    async fn close(&self, socket: ResponseSocket) {
        let address = socket.local_addr();
        let handles = socket.handle_count();
        drop(socket);
        if handles > 1 {
            tracing::warn!(address = %address, outstanding = handles - 1, "Response socket still referenced at close");
        } else {
            tracing::info!(address = %address, "Discovery response socket closed");
        }
    }
}
