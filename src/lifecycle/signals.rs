//! OS signal handling.
//!
//! The first SIGINT/SIGTERM/SIGQUIT fires the registered termination hook
//! (or requests a stop when none is registered). A second signal exits at
//! once.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::lifecycle::control::ControlFlags;
use crate::lifecycle::shutdown::ShutdownRegistry;

/// Waits for a termination signal.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Handle one termination request.
pub fn on_termination(registry: &ShutdownRegistry, control: &ControlFlags) {
    if !registry.fire() {
        tracing::info!("Termination requested with no active run");
        control.request_stop();
    }
}

/// Spawn the task that turns OS signals into a stop.
pub fn spawn_signal_listener(
    registry: Arc<ShutdownRegistry>,
    control: Arc<ControlFlags>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            tracing::error!(error = %e, "Could not install signal handlers");
            return;
        }
        tracing::info!("Termination signal received, shutting down");
        on_termination(&registry, &control);

        if wait_for_shutdown_signal().await.is_ok() {
            tracing::warn!("Second termination signal, exiting immediately");
            std::process::exit(0);
        }
    })
}
