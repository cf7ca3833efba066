//! # Cross-platform OS signal handling.
//!
//! [`signal_loop`] wraps [`wait_for_shutdown_signal`] as a supervised loop: when a
//! termination signal arrives the loop returns `Ok`, which makes the
//! supervisor unwind the whole pipeline like any other first-finisher.
//!
//! **Unix:** `SIGINT`, `SIGTERM`, `SIGQUIT`. **Windows:** `Ctrl-C`.

use tokio_util::sync::CancellationToken;

use crate::error::LoopError;
use crate::loops::{LoopFn, LoopRef};

/// Waits for a termination signal.
///
/// Returns `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
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

/// Loop that finishes when the process receives a termination signal.
pub fn signal_loop() -> LoopRef {
    LoopFn::arc("os-signals", |ctx: CancellationToken| async move {
        tokio::select! {
            res = wait_for_shutdown_signal() => {
                res.map_err(|e| LoopError::fatal(format!("signal registration failed: {e}")))
            }
            _ = ctx.cancelled() => Err(LoopError::Canceled),
        }
    })
}
