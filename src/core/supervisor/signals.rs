// src/core/supervisor/signals.rs

//! Signal handling for the supervisor process.
//!
//! `SIGINT`, `SIGTERM` and `SIGQUIT` all trigger the orderly teardown.
//! `SIGHUP` is swallowed so a closed controlling terminal cannot take the
//! monitor down; configuration reloads are mtime-driven instead. `SIGPIPE`
//! is already ignored by the Rust runtime, so a dying peer surfaces as a
//! write error on the affected socket.

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Waits for a termination signal, then broadcasts shutdown. `SIGHUP` is
/// consumed without effect.
pub async fn watch_signals(shutdown_tx: broadcast::Sender<()>) {
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to create SIGINT stream");
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to create SIGTERM stream");
    let mut sigquit = signal(SignalKind::quit()).expect("Failed to create SIGQUIT stream");
    let mut sighup = signal(SignalKind::hangup()).expect("Failed to create SIGHUP stream");

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }
            _ = sigquit.recv() => {
                info!("SIGQUIT received, initiating graceful shutdown.");
                break;
            }
            _ = sighup.recv() => {
                debug!("SIGHUP received and ignored.");
            }
        }
    }

    let _ = shutdown_tx.send(());
}
