//! Graceful shutdown coordinator.
//!
//! Listens for SIGINT (Ctrl+C) and SIGTERM and cancels a
//! [`tokio_util::sync::CancellationToken`] that the round scheduler observes.
//! A second signal force-exits. SIGHUP is ignored so the loop survives
//! terminal disconnection; the disposition is inherited by the engine child.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Set SIGHUP to `SIG_IGN` for this process and any children it spawns.
pub(crate) fn ignore_hangup() {
    // SAFETY: installing SIG_IGN has no handler code that could run
    // concurrently with the rest of the process.
    unsafe {
        libc::signal(libc::SIGHUP, libc::SIG_IGN);
    }
}

/// Install signal handlers and return a [`CancellationToken`] that is
/// cancelled on the first SIGINT / SIGTERM. A second signal force-exits the
/// process with status 130.
pub(crate) fn install_signal_handler() -> std::io::Result<CancellationToken> {
    use tokio::signal::unix::{signal, SignalKind};

    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    // Register before returning so a signal arriving right after startup is
    // never lost.
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let handler_token = token.clone();
    tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            };

            let prev = count.fetch_add(1, Ordering::SeqCst);
            if prev == 0 {
                tracing::info!("Received {}, shutting down", name);
                handler_token.cancel();
            } else {
                tracing::warn!("Received {} again, forcing exit", name);
                std::process::exit(130);
            }
        }
    });

    Ok(token)
}
