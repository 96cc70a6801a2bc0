//! Listener failure recovery.
//!
//! Installed on the web surface each iteration. Runs on the listener's task
//! and acts only through the captured `SystemControl`.

use std::sync::Arc;

use tokio::sync::watch;

use crate::http::{FailureHandler, ListenerError};
use crate::lifecycle::state::SupervisorState;
use crate::observability::metrics;
use crate::system::SystemControl;

/// What to do about a listener startup failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Bad key material: turn HTTPS off and wait for the operator.
    DisableHttps,
    /// Anything else: tear down and retry after the back-off.
    RestartListener,
}

impl RecoveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryAction::DisableHttps => "disable_https",
            RecoveryAction::RestartListener => "restart_listener",
        }
    }
}

pub fn classify(err: &ListenerError) -> RecoveryAction {
    match err {
        ListenerError::KeyStoreInvalid { .. } | ListenerError::KeyStorePassphraseInvalid { .. } => {
            RecoveryAction::DisableHttps
        }
        ListenerError::ListenerBindFailed { .. } | ListenerError::NotInitialized => {
            RecoveryAction::RestartListener
        }
    }
}

/// Routes listener failures for one iteration.
#[derive(Clone)]
pub struct FailureRouter {
    system: SystemControl,
    port: u16,
    state: Arc<watch::Sender<SupervisorState>>,
}

impl FailureRouter {
    pub fn new(system: SystemControl, port: u16, state: Arc<watch::Sender<SupervisorState>>) -> Self {
        Self {
            system,
            port,
            state,
        }
    }

    pub fn handle(&self, err: ListenerError) -> RecoveryAction {
        self.state.send_replace(SupervisorState::RecoverableFailure);
        metrics::record_state(SupervisorState::RecoverableFailure);

        let action = classify(&err);
        metrics::record_recovery(action.as_str());
        match action {
            RecoveryAction::DisableHttps => self.system.remove_https_settings(&err),
            RecoveryAction::RestartListener => {
                tracing::error!(
                    port = self.port,
                    error = %err,
                    "Could not start ha-bridge webservice"
                );
                self.system.schedule_listener_restart();
            }
        }
        action
    }

    pub fn into_handler(self) -> FailureHandler {
        Arc::new(move |err| {
            self.handle(err);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    use crate::config::SettingsStore;
    use crate::lifecycle::control::ControlFlags;

    fn router(dir: &tempfile::TempDir) -> (FailureRouter, SystemControl, watch::Receiver<SupervisorState>) {
        let store = Arc::new(SettingsStore::open(dir.path().join("habridge.toml")).unwrap());
        let system = SystemControl::new(store, Arc::new(ControlFlags::new()), 1);
        let (state, rx) = watch::channel(SupervisorState::Running);
        (FailureRouter::new(system.clone(), 8443, Arc::new(state)), system, rx)
    }

    #[test]
    fn key_store_errors_disable_https() {
        let invalid = ListenerError::KeyStoreInvalid {
            path: PathBuf::from("keystore.pem"),
            reason: "no certificates".to_string(),
        };
        let passphrase = ListenerError::KeyStorePassphraseInvalid {
            path: PathBuf::from("keystore.pem"),
        };
        assert_eq!(classify(&invalid), RecoveryAction::DisableHttps);
        assert_eq!(classify(&passphrase), RecoveryAction::DisableHttps);
    }

    #[test]
    fn bind_failure_restarts_listener() {
        let dir = tempfile::tempdir().unwrap();
        let (router, system, state) = router(&dir);
        let addr: SocketAddr = "0.0.0.0:80".parse().unwrap();
        let err = ListenerError::ListenerBindFailed {
            addr,
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };

        let handler = router.into_handler();
        handler(err);

        assert!(system.control().is_reinit());
        assert!(!system.control().is_stop());
        assert_eq!(*state.borrow(), SupervisorState::RecoverableFailure);
    }

    #[test]
    fn passphrase_failure_stops_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let (router, system, _state) = router(&dir);
        system.store().update(|config| config.security.use_https = true);

        let action = router.handle(ListenerError::KeyStorePassphraseInvalid {
            path: PathBuf::from("keystore.pem"),
        });

        assert_eq!(action, RecoveryAction::DisableHttps);
        assert!(system.control().is_stop());
        assert!(!system.control().is_reinit());
        assert!(!system.store().snapshot().security.use_https);
    }
}
