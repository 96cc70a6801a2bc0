//! System control: the per-iteration handle the failure router and the
//! system REST routes act through.
//!
//! # Data Flow
//! ```text
//! POST /system/control/{reinit,stop}  → SystemControl → ControlFlags
//! GET/PUT /system/settings            → SystemControl → SettingsStore
//! listener failure (own task)         → FailureRouter → SystemControl
//! ```
//!
//! # Design Decisions
//! - A fresh handle is created every iteration and captured by value in the
//!   failure handler; there is no process-wide "current system"
//! - Every write goes through the store's lock or the atomic flags

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::config::{ConfigError, SettingsStore};
use crate::http::ListenerError;
use crate::lifecycle::control::ControlFlags;

use self::handlers::*;

/// Handle to the running bridge for one supervisor iteration.
#[derive(Debug, Clone)]
pub struct SystemControl {
    store: Arc<SettingsStore>,
    control: Arc<ControlFlags>,
    iteration: u64,
}

impl SystemControl {
    pub fn new(store: Arc<SettingsStore>, control: Arc<ControlFlags>, iteration: u64) -> Self {
        Self {
            store,
            control,
            iteration,
        }
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn store(&self) -> &Arc<SettingsStore> {
        &self.store
    }

    pub fn control(&self) -> &Arc<ControlFlags> {
        &self.control
    }

    /// Ask for a new iteration with reloaded settings.
    pub fn reinit(&self) {
        tracing::info!(iteration = self.iteration, "Reinitialization requested");
        self.control.request_reinit();
    }

    /// Ask the process to exit after the current teardown.
    pub fn stop(&self) {
        tracing::info!(iteration = self.iteration, "Stop requested");
        self.control.request_stop();
    }

    /// End the current run so teardown stops its listener, then retry after
    /// the back-off.
    ///
    /// Runs on the listener's own task, so it cannot await the surface stop.
    pub fn schedule_listener_restart(&self) {
        tracing::warn!(iteration = self.iteration, "Restarting web listener after back-off");
        self.control.request_reinit();
    }

    /// Turn HTTPS off on disk and stop without an automatic retry.
    ///
    /// The operator restarts the process once the key store is fixed.
    pub fn remove_https_settings(&self, cause: &ListenerError) {
        tracing::error!(
            "Https settings have been removed as {}. Restart system manually after this process exits....",
            cause
        );
        if let Err(e) = self.store.disable_https() {
            tracing::error!(error = %e, "Could not persist disabled HTTPS settings");
        }
        self.control.request_stop();
    }

    /// Write settings to disk when they changed since the last persist.
    pub fn persist_if_changed(&self) -> Result<bool, ConfigError> {
        self.store.persist_if_changed()
    }

    /// REST routes for this iteration's system API.
    pub fn routes(&self) -> Router {
        Router::new()
            .route("/system/habridge/version", get(get_version))
            .route("/system/settings", get(get_settings).put(put_settings))
            .route("/system/control/reinit", post(post_reinit))
            .route("/system/control/stop", post(post_stop))
            .route("/system/security/testuser", post(post_test_user))
            .with_state(self.clone())
    }
}
