//! HA Bridge
//!
//! Emulates a discoverable smart-home hub so voice assistants can find and
//! switch arbitrary backend devices.
//!
//! # Architecture Overview
//!
//! ```text
//!   M-SEARCH ──▶ discovery responder ──▶ reply from response socket
//!                       │
//!                       │ listen() returns on stop / reinit
//!                       ▼
//!   ┌──────────────── supervisor loop ────────────────┐
//!   │ CONFIGURING → STARTING_LISTENERS → RUNNING      │
//!   │      ▲                               │          │
//!   │      └──── back-off ◀── TEARING_DOWN ◀┘          │
//!   └─────────────────────────────────────────────────┘
//!                       │
//!   web surface ◀───────┘  /api (emulation), /system (control),
//!                          /description.xml, static assets
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use ha_bridge::config::loader::load_config;
use ha_bridge::config::SettingsStore;
use ha_bridge::lifecycle::Supervisor;
use ha_bridge::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "ha-bridge", version, about = "Smart-home hub emulator")]
struct Cli {
    /// Settings file, created with defaults when missing.
    #[arg(short, long, default_value = "data/habridge.toml")]
    config: PathBuf,

    /// Log level; RUST_LOG takes precedence.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = cli.log_level.clone().or_else(|| {
        load_config(&cli.config)
            .ok()
            .map(|config| config.observability.log_level)
    });
    logging::init_tracing(level.as_deref());

    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?cli.config, "ha-bridge starting");

    let store = match SettingsStore::open(&cli.config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, path = ?cli.config, "Could not open settings");
            return ExitCode::SUCCESS;
        }
    };

    let observability = store.snapshot().observability.clone();
    if observability.metrics_enabled {
        match observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let supervisor = Supervisor::builder(store).build();
    let report = supervisor.run().await;
    tracing::debug!(iterations = report.iterations, reason = ?report.reason, "Supervisor finished");

    ExitCode::SUCCESS
}
