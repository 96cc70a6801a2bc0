//! SSDP discovery responder.
//!
//! Joins the SSDP multicast group and answers searches for a hub with the
//! location of the device description. Replies leave through the run's
//! response socket, not the multicast socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::config::NetworkConfig;
use crate::discovery::{DiscoveryError, DiscoveryListener, DiscoveryService};
use crate::lifecycle::control::{ControlFlags, ListenOutcome};
use crate::net::ResponseSocket;
use crate::observability::metrics;

pub const SSDP_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const SSDP_PORT: u16 = 1900;

/// Search targets a hub answers.
const SEARCH_TARGETS: [&str; 3] = [
    "ssdp:all",
    "upnp:rootdevice",
    "urn:schemas-upnp-org:device:basic:1",
];

/// SSDP responder factory.
#[derive(Debug, Clone)]
pub struct SsdpDiscovery {
    listen_port: u16,
}

impl SsdpDiscovery {
    pub fn new(listen_port: u16) -> Self {
        Self { listen_port }
    }
}

impl Default for SsdpDiscovery {
    fn default() -> Self {
        Self::new(SSDP_PORT)
    }
}

#[async_trait]
impl DiscoveryService for SsdpDiscovery {
    async fn start(
        &self,
        network: &NetworkConfig,
        control: Arc<ControlFlags>,
        socket: ResponseSocket,
    ) -> Result<Box<dyn DiscoveryListener>, DiscoveryError> {
        let interface = match network.upnp_config_address {
            IpAddr::V4(addr) if network.use_upnp_iface => addr,
            _ => Ipv4Addr::UNSPECIFIED,
        };
        let multicast = open_multicast(self.listen_port, interface)?;

        tracing::info!(
            port = self.listen_port,
            interface = %interface,
            "Discovery responder started"
        );
        Ok(Box::new(SsdpListener::new(
            multicast,
            socket,
            control,
            network.clone(),
        )))
    }
}

fn open_multicast(port: u16, interface: Ipv4Addr) -> Result<UdpSocket, DiscoveryError> {
    let socket_error = |source| DiscoveryError::Socket { port, source };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(socket_error)?;
    socket.set_reuse_address(true).map_err(socket_error)?;
    socket.set_nonblocking(true).map_err(socket_error)?;
    let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    socket.bind(&bind.into()).map_err(socket_error)?;
    socket
        .join_multicast_v4(&SSDP_GROUP, &interface)
        .map_err(|source| DiscoveryError::Multicast { interface, source })?;

    UdpSocket::from_std(socket.into()).map_err(socket_error)
}

/// Running responder for one iteration.
pub struct SsdpListener {
    multicast: UdpSocket,
    response: ResponseSocket,
    control: Arc<ControlFlags>,
    network: NetworkConfig,
}

impl SsdpListener {
    pub fn new(
        multicast: UdpSocket,
        response: ResponseSocket,
        control: Arc<ControlFlags>,
        network: NetworkConfig,
    ) -> Self {
        Self {
            multicast,
            response,
            control,
            network,
        }
    }

    async fn answer(&self, request: &str, sender: SocketAddr) {
        let Some(target) = search_target(request) else {
            return;
        };
        if self.network.trace_upnp {
            tracing::info!(sender = %sender, target = %target, "Discovery search received");
        }

        let reply = search_response(&self.network, target);
        match self.response.send_to(reply.as_bytes(), sender).await {
            Ok(_) => {
                metrics::record_discovery_response();
                if self.network.trace_upnp {
                    tracing::info!(sender = %sender, "Discovery response sent");
                }
            }
            Err(e) => tracing::warn!(sender = %sender, error = %e, "Discovery response failed"),
        }
    }
}

#[async_trait]
impl DiscoveryListener for SsdpListener {
    async fn listen(self: Box<Self>) -> ListenOutcome {
        let mut changes = self.control.subscribe();
        let mut buf = vec![0u8; 2048];

        while !self.control.should_return() {
            tokio::select! {
                received = self.multicast.recv_from(&mut buf) => match received {
                    Ok((len, sender)) => {
                        let request = String::from_utf8_lossy(&buf[..len]);
                        self.answer(&request, sender).await;
                    }
                    Err(e) => tracing::warn!(error = %e, "Discovery receive failed"),
                },
                _ = changes.changed() => {}
            }
        }

        let outcome = self.control.outcome();
        tracing::info!(outcome = ?outcome, "Discovery responder returning");
        outcome
    }
}

/// The search target of an `M-SEARCH` this hub should answer.
pub fn search_target(request: &str) -> Option<&str> {
    let mut lines = request.lines();
    let start = lines.next()?.trim();
    if !start.eq_ignore_ascii_case("M-SEARCH * HTTP/1.1") {
        return None;
    }

    let mut discover = false;
    let mut target = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_uppercase().as_str() {
            "MAN" => discover = value.trim_matches('"').eq_ignore_ascii_case("ssdp:discover"),
            "ST" => target = Some(value),
            _ => {}
        }
    }

    let target = target?;
    (discover && SEARCH_TARGETS.iter().any(|st| st.eq_ignore_ascii_case(target))).then_some(target)
}

/// Reply to a search for `target`.
pub fn search_response(network: &NetworkConfig, target: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age=100\r\n\
         EXT:\r\n\
         LOCATION: http://{addr}:{port}/description.xml\r\n\
         SERVER: Linux/3.14.0 UPnP/1.0 IpBridge/1.24.0\r\n\
         hue-bridgeid: {id}\r\n\
         ST: {target}\r\n\
         USN: uuid:{id}::{target}\r\n\r\n",
        addr = network.upnp_config_address,
        port = network.server_port,
        id = network.bridge_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SEARCH: &str = "M-SEARCH * HTTP/1.1\r\n\
                          HOST: 239.255.255.250:1900\r\n\
                          MAN: \"ssdp:discover\"\r\n\
                          MX: 2\r\n\
                          ST: urn:schemas-upnp-org:device:basic:1\r\n\r\n";

    fn network() -> NetworkConfig {
        NetworkConfig {
            server_port: 8080,
            upnp_config_address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            bridge_id: "2f402f80-da50-11e1-9b23-001788255acc".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn recognizes_hub_searches() {
        assert_eq!(
            search_target(SEARCH),
            Some("urn:schemas-upnp-org:device:basic:1")
        );
        assert_eq!(search_target("NOTIFY * HTTP/1.1\r\nST: ssdp:all\r\n"), None);
        assert_eq!(
            search_target("M-SEARCH * HTTP/1.1\r\nMAN: \"ssdp:discover\"\r\nST: urn:dial-multiscreen-org:service:dial:1\r\n"),
            None
        );
    }

    #[test]
    fn response_points_at_description() {
        let reply = search_response(&network(), "upnp:rootdevice");
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.contains("LOCATION: http://192.168.1.20:8080/description.xml\r\n"));
        assert!(reply.contains("USN: uuid:2f402f80-da50-11e1-9b23-001788255acc::upnp:rootdevice\r\n"));
    }

    #[tokio::test]
    async fn listener_answers_and_returns_on_reinit() {
        let multicast = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let listen_addr = multicast.local_addr().unwrap();
        let response =
            ResponseSocket::new(UdpSocket::bind("127.0.0.1:0").await.unwrap()).unwrap();
        let control = Arc::new(ControlFlags::new());

        let listener = Box::new(SsdpListener::new(
            multicast,
            response.clone(),
            Arc::clone(&control),
            network(),
        ));
        let task = tokio::spawn(listener.listen());

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(SEARCH.as_bytes(), listen_addr).await.unwrap();

        let mut buf = [0u8; 1024];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .expect("no discovery response")
            .unwrap();
        assert_eq!(from, response.local_addr());
        assert!(String::from_utf8_lossy(&buf[..len]).contains("/description.xml"));

        control.request_reinit();
        let outcome = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("listener did not return")
            .unwrap();
        assert_eq!(outcome, ListenOutcome::ReinitRequested);
    }

    #[tokio::test]
    async fn listener_returns_immediately_when_already_stopped() {
        let multicast = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let response =
            ResponseSocket::new(UdpSocket::bind("127.0.0.1:0").await.unwrap()).unwrap();
        let control = Arc::new(ControlFlags::new());
        control.request_stop();

        let listener = Box::new(SsdpListener::new(multicast, response, control, network()));
        assert_eq!(listener.listen().await, ListenOutcome::Stopped);
    }
}
