//! Settings store shared by the supervisor, the web surface and recovery.
//!
//! # Responsibilities
//! - Hold the current settings snapshot for lock-free readers
//! - Track whether in-memory settings differ from disk ("changed")
//! - Reload from and persist to the settings file
//!
//! # Design Decisions
//! - Readers take an `Arc` snapshot via `arc-swap`; one snapshot per iteration
//! - Writers (reload, update, persist) serialize on one lock so a recovery
//!   write never interleaves with a reload on the supervisor task
//! - A missing settings file is created from defaults

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;

use crate::config::loader::{load_config, save_config, ConfigError};
use crate::config::schema::{BridgeConfig, NetworkConfig, SecurityConfig};
use crate::config::validation::validate_config;

/// Persistent settings with a "changed" flag.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    current: ArcSwap<BridgeConfig>,
    changed: AtomicBool,
    writer: Mutex<()>,
}

impl SettingsStore {
    /// Open the store at `path`, creating the file from defaults if absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let store = Self {
            path: path.into(),
            current: ArcSwap::from_pointee(BridgeConfig::default()),
            changed: AtomicBool::new(false),
            writer: Mutex::new(()),
        };
        store.load()?;
        Ok(store)
    }

    /// Path of the backing settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload settings from disk and make them the current snapshot.
    pub fn load(&self) -> Result<Arc<BridgeConfig>, ConfigError> {
        let _guard = self.lock_writer();

        let mut config = if self.path.exists() {
            load_config(&self.path)?
        } else {
            tracing::info!(path = ?self.path, "Settings file not found, writing defaults");
            BridgeConfig::default()
        };

        let generated_id = config.network.bridge_id.is_empty();
        if generated_id {
            config.network.bridge_id = uuid::Uuid::new_v4().to_string();
        }
        let needs_write = generated_id || !self.path.exists();

        // Publish before writing so a watcher sees its own write as unchanged.
        let config = Arc::new(config);
        self.current.store(Arc::clone(&config));
        self.changed.store(needs_write, Ordering::SeqCst);
        if needs_write {
            self.persist_locked()?;
        }

        tracing::debug!(path = ?self.path, "Settings loaded");
        Ok(config)
    }

    /// Current settings snapshot.
    pub fn snapshot(&self) -> Arc<BridgeConfig> {
        self.current.load_full()
    }

    pub fn network(&self) -> NetworkConfig {
        self.current.load().network.clone()
    }

    pub fn security(&self) -> SecurityConfig {
        self.current.load().security.clone()
    }

    /// Apply `edit` to a copy of the current settings and publish it.
    ///
    /// Marks the store changed; nothing is written to disk.
    pub fn update<F>(&self, edit: F) -> Arc<BridgeConfig>
    where
        F: FnOnce(&mut BridgeConfig),
    {
        let _guard = self.lock_writer();
        self.update_locked(edit)
    }

    /// Replace the settings wholesale after validating them.
    pub fn replace(&self, config: BridgeConfig) -> Result<(), ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let _guard = self.lock_writer();
        self.current.store(Arc::new(config));
        self.changed.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::SeqCst)
    }

    /// Write the current snapshot to disk and clear the changed flag.
    pub fn persist(&self) -> Result<(), ConfigError> {
        let _guard = self.lock_writer();
        self.persist_locked()
    }

    /// Persist only when the in-memory settings differ from disk.
    ///
    /// Returns whether a write happened.
    pub fn persist_if_changed(&self) -> Result<bool, ConfigError> {
        let _guard = self.lock_writer();
        if !self.is_changed() {
            return Ok(false);
        }
        self.persist_locked()?;
        Ok(true)
    }

    /// Purge ephemeral test credentials. Safe to call when none exist.
    pub fn remove_test_users(&self) -> usize {
        let _guard = self.lock_writer();
        if !self.current.load().security.has_test_users() {
            return 0;
        }

        let mut removed = 0;
        self.update_locked(|config| removed = config.security.remove_test_users());
        tracing::info!(removed, "Removed test credentials");
        removed
    }

    /// Turn HTTPS off and write the result to disk immediately.
    pub fn disable_https(&self) -> Result<(), ConfigError> {
        let _guard = self.lock_writer();
        self.update_locked(|config| config.security.use_https = false);
        self.persist_locked()
    }

    fn update_locked<F>(&self, edit: F) -> Arc<BridgeConfig>
    where
        F: FnOnce(&mut BridgeConfig),
    {
        let mut next = BridgeConfig::clone(&self.current.load());
        edit(&mut next);
        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        self.changed.store(true, Ordering::SeqCst);
        next
    }

    fn persist_locked(&self) -> Result<(), ConfigError> {
        save_config(&self.path, &self.current.load())?;
        self.changed.store(false, Ordering::SeqCst);
        tracing::info!(path = ?self.path, "Settings persisted");
        Ok(())
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
