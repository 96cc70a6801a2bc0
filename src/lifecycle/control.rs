//! Control flags steering the supervisor loop.
//!
//! `stop` ends the process after the current teardown; `reinit` asks for a
//! fresh iteration with reloaded settings. Every mutation bumps a watch
//! channel so a task blocked on the flags wakes without polling.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Why the discovery responder handed control back to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    /// Settings changed; run another iteration.
    ReinitRequested,
    /// Terminal stop.
    Stopped,
}

/// Shared stop/reinit flags for one supervisor run.
#[derive(Debug)]
pub struct ControlFlags {
    stop: AtomicBool,
    reinit: AtomicBool,
    generation: watch::Sender<u64>,
}

impl ControlFlags {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            stop: AtomicBool::new(false),
            reinit: AtomicBool::new(false),
            generation,
        }
    }

    pub fn is_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn is_reinit(&self) -> bool {
        self.reinit.load(Ordering::SeqCst)
    }

    /// Request a terminal stop.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.bump();
    }

    /// Request a reinitialization with freshly loaded settings.
    pub fn request_reinit(&self) {
        self.reinit.store(true, Ordering::SeqCst);
        self.bump();
    }

    /// Clear the reinit flag, returning whether it was set.
    pub fn take_reinit(&self) -> bool {
        self.reinit.swap(false, Ordering::SeqCst)
    }

    /// Whether a listener should hand control back to the supervisor.
    pub fn should_return(&self) -> bool {
        self.is_stop() || self.is_reinit()
    }

    /// The outcome a listener reports once `should_return` holds.
    pub fn outcome(&self) -> ListenOutcome {
        if self.is_stop() {
            ListenOutcome::Stopped
        } else {
            ListenOutcome::ReinitRequested
        }
    }

    /// Subscribe to flag changes.
    ///
    /// Subscribe before checking the flags: a change made in between is
    /// still reported by the receiver.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// Wait until a stop or reinit has been requested.
    pub async fn wait_for_request(&self) -> ListenOutcome {
        let mut changes = self.subscribe();
        while !self.should_return() {
            // The sender lives in `self`, so `changed` cannot fail here.
            if changes.changed().await.is_err() {
                break;
            }
        }
        self.outcome()
    }

    fn bump(&self) {
        self.generation.send_modify(|generation| *generation += 1);
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::new()
    }
}
