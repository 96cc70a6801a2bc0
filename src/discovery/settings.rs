//! Device description resource fetched by controllers after discovery.

use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::config::NetworkConfig;
use crate::http::WebSurface;

pub struct DiscoverySettingsResource;

impl DiscoverySettingsResource {
    /// Register `/description.xml` for this run's network settings.
    pub fn start(network: &NetworkConfig, surface: &dyn WebSurface) {
        let body = description_xml(network);
        let route = get(move || {
            let body = body.clone();
            async move { ([(header::CONTENT_TYPE, "text/xml")], body).into_response() }
        });
        surface.add_routes(Router::new().route("/description.xml", route));
        tracing::debug!("Discovery description resource registered");
    }
}

pub fn description_xml(network: &NetworkConfig) -> String {
    let base = format!(
        "http://{}:{}/",
        network.upnp_config_address, network.server_port
    );
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" ?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
<specVersion><major>1</major><minor>0</minor></specVersion>
<URLBase>{base}</URLBase>
<device>
<deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
<friendlyName>HA-Bridge ({addr})</friendlyName>
<manufacturer>Royal Philips Electronics</manufacturer>
<modelDescription>Hue Emulator for HA bridge</modelDescription>
<modelName>Philips hue bridge 2015</modelName>
<modelNumber>BSB002</modelNumber>
<serialNumber>{id}</serialNumber>
<UDN>uuid:{id}</UDN>
<presentationURL>index.html</presentationURL>
</device>
</root>
"#,
        addr = network.upnp_config_address,
        id = network.bridge_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn description_carries_base_url_and_id() {
        let network = NetworkConfig {
            server_port: 8080,
            upnp_config_address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
            bridge_id: "bridge-1".to_string(),
            ..Default::default()
        };

        let xml = description_xml(&network);
        assert!(xml.contains("<URLBase>http://10.0.0.5:8080/</URLBase>"));
        assert!(xml.contains("<UDN>uuid:bridge-1</UDN>"));
    }
}
