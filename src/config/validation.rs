//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (HTTPS needs key material, device ids unique)
//! - Validate value ranges (back-off bounded, metrics address parses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before settings are accepted into the store

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::BridgeConfig;

/// Longest back-off accepted between supervisor iterations.
const MAX_BACKOFF_SECS: u64 = 3600;

/// A single semantic problem with the settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("use_https is set but no keystore_path is configured")]
    MissingKeystore,

    #[error("backoff_secs {0} exceeds {max}", max = MAX_BACKOFF_SECS)]
    BackoffTooLong(u64),

    #[error("device at index {0} has an empty id")]
    EmptyDeviceId(usize),

    #[error("duplicate device id '{0}'")]
    DuplicateDeviceId(String),

    #[error("whitelist entry at index {0} has an empty username")]
    EmptyUsername(usize),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
}

/// Check the settings for semantic errors.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.security.use_https && config.security.keystore_path.is_none() {
        errors.push(ValidationError::MissingKeystore);
    }

    if config.control.backoff_secs > MAX_BACKOFF_SECS {
        errors.push(ValidationError::BackoffTooLong(config.control.backoff_secs));
    }

    let mut seen = HashSet::new();
    for (index, device) in config.devices.iter().enumerate() {
        if device.id.trim().is_empty() {
            errors.push(ValidationError::EmptyDeviceId(index));
        } else if !seen.insert(device.id.as_str()) {
            errors.push(ValidationError::DuplicateDeviceId(device.id.clone()));
        }
    }

    for (index, entry) in config.security.whitelist.iter().enumerate() {
        if entry.username.trim().is_empty() {
            errors.push(ValidationError::EmptyUsername(index));
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::DeviceConfig;

    fn device(id: &str) -> DeviceConfig {
        DeviceConfig {
            id: id.to_string(),
            name: format!("Lamp {id}"),
            on_url: None,
            off_url: None,
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&BridgeConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = BridgeConfig::default();
        config.security.use_https = true;
        config.devices = vec![device("1"), device("1"), device(" ")];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::MissingKeystore,
                ValidationError::DuplicateDeviceId("1".to_string()),
                ValidationError::EmptyDeviceId(2),
            ]
        );
    }

    #[test]
    fn web_and_response_ports_may_match() {
        // TCP listener and UDP response socket never share a port space.
        let mut config = BridgeConfig::default();
        config.network.upnp_response_port = config.network.server_port;
        assert!(validate_config(&config).is_ok());
    }
}
