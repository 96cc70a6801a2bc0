//! Settings file watcher for live reconfiguration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::loader::load_config;
use crate::config::store::SettingsStore;
use crate::lifecycle::control::ControlFlags;

/// Watches the settings file and requests a reinit when it is edited.
pub struct ConfigWatcher {
    path: PathBuf,
    store: Arc<SettingsStore>,
    control: Arc<ControlFlags>,
}

impl ConfigWatcher {
    pub fn new(store: Arc<SettingsStore>, control: Arc<ControlFlags>) -> Self {
        Self {
            path: store.path().to_path_buf(),
            store,
            control,
        }
    }

    /// Start watching the settings file in a background thread.
    ///
    /// The parent directory is watched because persisting replaces the file.
    /// Writes that match the current snapshot (our own persists) are ignored.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let file_name = self.path.file_name().map(|name| name.to_os_string());
        let store = self.store;
        let control = self.control;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_settings = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref());
                    if !touches_settings || !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    match load_config(&path) {
                        Ok(edited) if edited != *store.snapshot() => {
                            tracing::info!(path = ?path, "Settings file edited, requesting reinitialization");
                            control.request_reinit();
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!("Ignoring settings edit: {}. Keeping current settings.", e);
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Settings watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::save_config;

    #[tokio::test]
    async fn external_edit_requests_reinit() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SettingsStore::open(dir.path().join("habridge.toml")).unwrap());
        let control = Arc::new(ControlFlags::new());
        let _watcher = ConfigWatcher::new(Arc::clone(&store), Arc::clone(&control))
            .run()
            .unwrap();

        let mut edited = (*store.snapshot()).clone();
        edited.network.server_port = 8080;
        save_config(store.path(), &edited).unwrap();

        tokio::time::timeout(Duration::from_secs(5), control.wait_for_request())
            .await
            .expect("edit did not request a reinit");
        assert!(control.is_reinit());
        assert!(!control.is_stop());
    }
}
