//! Metrics collection and exposition.
//!
//! # Metrics
//! - `habridge_iterations_total` (counter): supervisor iterations started
//! - `habridge_reinits_total` (counter): reinitializations performed
//! - `habridge_recoveries_total` (counter): listener failures by action
//! - `habridge_discovery_responses_total` (counter): search replies sent
//! - `habridge_supervisor_state` (gauge): current state, see `state_code`
//!
//! Recording without an installed exporter is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::lifecycle::state::SupervisorState;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_iteration(iteration: u64) {
    ::metrics::counter!("habridge_iterations_total").increment(1);
    tracing::trace!(iteration, "Recorded iteration");
}

pub fn record_reinit() {
    ::metrics::counter!("habridge_reinits_total").increment(1);
}

pub fn record_recovery(action: &'static str) {
    ::metrics::counter!("habridge_recoveries_total", "action" => action).increment(1);
}

pub fn record_discovery_response() {
    ::metrics::counter!("habridge_discovery_responses_total").increment(1);
}

pub fn record_state(state: SupervisorState) {
    ::metrics::gauge!("habridge_supervisor_state").set(state_code(state));
}

pub fn state_code(state: SupervisorState) -> f64 {
    match state {
        SupervisorState::Stopped => 0.0,
        SupervisorState::Configuring => 1.0,
        SupervisorState::StartingListeners => 2.0,
        SupervisorState::Running => 3.0,
        SupervisorState::TearingDown => 4.0,
        SupervisorState::RecoverableFailure => 5.0,
    }
}
