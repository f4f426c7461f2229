//! Process-wide cancellation flag.
//!
//! `spec.md` §9 Design Notes calls for replacing a module-level mutable
//! boolean with "a single atomic flag owned by the orchestrator and passed
//! by reference into each supervisor." This is that flag, plus the signal
//! listener task that sets it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared, cheaply-cloneable handle to the run's stop flag.
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Checkpoint used by supervisor poll loops.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Spawn a task that sets `flag` when SIGINT (or, on unix, SIGTERM) arrives.
pub fn install_handler(flag: StopFlag) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    loop {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            flag.set();
                        }
                        break;
                    }
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received SIGINT, requesting stop");
                    flag.set();
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, requesting stop");
                    flag.set();
                }
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received ctrl-c, requesting stop");
                flag.set();
            }
        }
    });
}
