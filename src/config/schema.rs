//! Configuration schema definitions.
//!
//! This module defines the complete settings structure for the bridge.
//! All types derive Serde traits for (de)serialization of the settings file.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// Root settings for the bridge.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Web listener and discovery settings.
    pub network: NetworkConfig,

    /// HTTPS and credential settings.
    pub security: SecurityConfig,

    /// Supervisor loop tuning.
    pub control: ControlConfig,

    /// Web surface and outbound pool settings.
    pub http: HttpConfig,

    /// Backend devices exposed through the emulation API.
    pub devices: Vec<DeviceConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Network settings, snapshotted once per supervisor iteration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the web listener binds to.
    pub web_address: IpAddr,

    /// Port the web listener binds to.
    pub server_port: u16,

    /// Local port of the datagram socket used to answer discovery requests.
    pub upnp_response_port: u16,

    /// Address advertised in discovery responses.
    pub upnp_config_address: IpAddr,

    /// Join the discovery multicast group on `upnp_config_address` only.
    pub use_upnp_iface: bool,

    /// Log every discovery request and response.
    pub trace_upnp: bool,

    /// Stable identifier advertised as the bridge's USN. Generated on first load.
    pub bridge_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            web_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            server_port: 80,
            upnp_response_port: 50000,
            upnp_config_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            use_upnp_iface: false,
            trace_upnp: false,
            bridge_id: String::new(),
        }
    }
}

/// Security settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Serve the web surface over HTTPS.
    pub use_https: bool,

    /// PEM bundle holding the certificate chain and private key.
    pub keystore_path: Option<PathBuf>,

    /// Passphrase for an encrypted private key in the bundle.
    pub keystore_password: String,

    /// Users allowed to call the emulation API.
    pub whitelist: Vec<WhitelistEntry>,
}

impl SecurityConfig {
    /// Drop every ephemeral test credential. Returns how many were removed.
    pub fn remove_test_users(&mut self) -> usize {
        let before = self.whitelist.len();
        self.whitelist.retain(|entry| !entry.test);
        before - self.whitelist.len()
    }

    /// Whether any ephemeral test credential is present.
    pub fn has_test_users(&self) -> bool {
        self.whitelist.iter().any(|entry| entry.test)
    }

    /// Whether `username` is allowed to use the emulation API.
    pub fn is_whitelisted(&self, username: &str) -> bool {
        self.whitelist.iter().any(|entry| entry.username == username)
    }
}

/// A user allowed to call the emulation API.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WhitelistEntry {
    pub username: String,

    /// Device type reported by the client that created the user.
    #[serde(default)]
    pub device_type: String,

    /// Ephemeral credential created for API testing.
    #[serde(default)]
    pub test: bool,
}

/// Supervisor loop tuning.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Fixed delay between a non-fatal teardown and the next startup.
    pub backoff_secs: u64,

    /// Request a reinit when the settings file is edited externally.
    pub watch_settings: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            backoff_secs: 5,
            watch_settings: false,
        }
    }
}

/// Web surface and outbound pool settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Directory of static assets served behind the API routes.
    pub static_root: PathBuf,

    /// Upper bound for draining outbound requests at exit.
    pub pool_shutdown_secs: u64,

    /// Timeout for a single outbound device request.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            static_root: PathBuf::from("public"),
            pool_shutdown_secs: 5,
            request_timeout_secs: 10,
        }
    }
}

/// A backend device driven over HTTP.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Light identifier exposed by the emulation API.
    pub id: String,

    /// Friendly name announced to controllers.
    pub name: String,

    /// URL requested when the device is switched on.
    pub on_url: Option<Url>,

    /// URL requested when the device is switched off.
    pub off_url: Option<Url>,
}

/// Observability settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, test: bool) -> WhitelistEntry {
        WhitelistEntry {
            username: name.to_string(),
            device_type: "echo".to_string(),
            test,
        }
    }

    #[test]
    fn remove_test_users_is_idempotent() {
        let mut security = SecurityConfig {
            whitelist: vec![entry("alice", false), entry("tester", true)],
            ..Default::default()
        };

        assert!(security.has_test_users());
        assert_eq!(security.remove_test_users(), 1);
        assert_eq!(security.remove_test_users(), 0);
        assert!(!security.has_test_users());
        assert!(security.is_whitelisted("alice"));
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let config: BridgeConfig = toml::from_str("[network]\nserver_port = 8080\n").unwrap();
        assert_eq!(config.network.server_port, 8080);
        assert_eq!(config.control.backoff_secs, 5);
        assert!(!config.security.use_https);
    }
}
