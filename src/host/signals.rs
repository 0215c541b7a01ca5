//! OS signal handling

use super::shutdown::{ShutdownCause, ShutdownCoordinator};
use crate::utils::error::AppResult;
use std::sync::Arc;

/// Trigger shutdown on SIGINT or SIGUSR2
#[cfg(unix)]
pub fn install(shutdown: Arc<ShutdownCoordinator>) -> AppResult<()> {
    use tokio::signal::unix::{signal, SignalKind};

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::user_defined2(), "SIGUSR2"),
    ] {
        let mut stream = signal(kind)?;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                tracing::debug!("Received {}.", name);
                shutdown.trigger(ShutdownCause::Signal(name));
            }
        });
    }
    Ok(())
}

/// Trigger shutdown on Ctrl-C
#[cfg(not(unix))]
pub fn install(shutdown: Arc<ShutdownCoordinator>) -> AppResult<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                return;
            }
            tracing::debug!("Received Ctrl+C.");
            shutdown.trigger(ShutdownCause::Signal("SIGINT"));
        }
    });
    Ok(())
}
