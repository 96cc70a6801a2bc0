//! Process-termination hook bound to the current run.
//!
//! # Design Decisions
//! - One slot: at most one hook is registered at any time
//! - Replacing a hook deregisters the old one before registering the new one,
//!   both under the slot lock
//! - Firing takes the hook out of the slot, so a signal acts exactly once

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::system::SystemControl;

/// What runs when the process is asked to terminate.
#[derive(Debug, Clone)]
pub struct ShutdownHook {
    system: SystemControl,
}

impl ShutdownHook {
    pub fn new(system: SystemControl) -> Self {
        Self { system }
    }

    pub fn iteration(&self) -> u64 {
        self.system.iteration()
    }

    /// Persist changed settings and stop the bridge.
    pub fn run(self) {
        tracing::info!(iteration = self.iteration(), "Termination hook running");
        if let Err(e) = self.system.persist_if_changed() {
            tracing::warn!(error = %e, "Could not persist settings on termination");
        }
        self.system.stop();
    }
}

/// Holds the single registered termination hook.
#[derive(Debug, Default)]
pub struct ShutdownRegistry {
    slot: Mutex<Option<ShutdownHook>>,
    fired: AtomicU64,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deregister the current hook, then register `hook`.
    ///
    /// Returns the hook that was deregistered.
    pub fn replace(&self, hook: ShutdownHook) -> Option<ShutdownHook> {
        let mut slot = self.lock_slot();
        let previous = slot.take();
        if let Some(old) = &previous {
            tracing::debug!(iteration = old.iteration(), "Termination hook deregistered");
        }
        tracing::debug!(iteration = hook.iteration(), "Termination hook registered");
        *slot = Some(hook);
        previous
    }

    pub fn deregister(&self) -> Option<ShutdownHook> {
        let previous = self.lock_slot().take();
        if let Some(old) = &previous {
            tracing::debug!(iteration = old.iteration(), "Termination hook deregistered");
        }
        previous
    }

    pub fn is_registered(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Iteration of the registered hook, if any.
    pub fn registered_iteration(&self) -> Option<u64> {
        self.lock_slot().as_ref().map(ShutdownHook::iteration)
    }

    /// Run the registered hook once. Returns false when none was registered.
    pub fn fire(&self) -> bool {
        let hook = self.lock_slot().take();
        match hook {
            Some(hook) => {
                self.fired.fetch_add(1, Ordering::SeqCst);
                hook.run();
                true
            }
            None => false,
        }
    }

    /// How many times a hook actually ran.
    pub fn fired_count(&self) -> u64 {
        self.fired.load(Ordering::SeqCst)
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<ShutdownHook>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::SettingsStore;
    use crate::lifecycle::control::ControlFlags;

    fn hook(store: &Arc<SettingsStore>, control: &Arc<ControlFlags>, iteration: u64) -> ShutdownHook {
        ShutdownHook::new(SystemControl::new(
            Arc::clone(store),
            Arc::clone(control),
            iteration,
        ))
    }

    #[test]
    fn replace_swaps_the_single_hook() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SettingsStore::open(dir.path().join("habridge.toml")).unwrap());
        let control = Arc::new(ControlFlags::new());
        let registry = ShutdownRegistry::new();

        assert!(registry.replace(hook(&store, &control, 1)).is_none());
        let previous = registry.replace(hook(&store, &control, 2)).unwrap();

        assert_eq!(previous.iteration(), 1);
        assert_eq!(registry.registered_iteration(), Some(2));
    }

    #[test]
    fn fire_runs_once_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SettingsStore::open(dir.path().join("habridge.toml")).unwrap());
        let control = Arc::new(ControlFlags::new());
        let registry = ShutdownRegistry::new();
        registry.replace(hook(&store, &control, 1));
        store.update(|config| config.network.server_port = 8081);

        assert!(registry.fire());
        assert!(!registry.fire());

        assert_eq!(registry.fired_count(), 1);
        assert!(control.is_stop());
        assert!(!store.is_changed());
        assert!(!registry.is_registered());
    }
}
