//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level when set.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor a level is given.
pub const DEFAULT_FILTER: &str = "ha_bridge=info,tower_http=info";

/// Build the filter for `level` ("info", "debug", ...).
pub fn filter_for(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) => EnvFilter::new(format!("ha_bridge={level},tower_http={level}")),
        None => EnvFilter::new(DEFAULT_FILTER),
    })
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(level: Option<&str>) {
    let installed = tracing_subscriber::registry()
        .with(filter_for(level))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
