//! Graceful Shutdown Handler
//!
//! Ctrl+C flips a shared flag and wakes anyone waiting on it. The headless
//! runner reacts by stopping the mint loop and letting the last attempt settle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Shared shutdown signal
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Resolves once shutdown has been requested
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_shutdown() {
                return;
            }
            notified.await;
        }
    }
}

/// Wait for Ctrl+C. Returns false if the handler could not be installed.
pub async fn wait_for_ctrl_c() -> bool {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal, stopping...");
            true
        }
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {}", e);
            false
        }
    }
}

/// Run shutdown handler in background
/// Returns a ShutdownSignal that will be triggered on Ctrl+C
pub fn spawn_shutdown_handler() -> ShutdownSignal {
    let signal = ShutdownSignal::new();
    let signal_clone = signal.clone();

    tokio::spawn(async move {
        if wait_for_ctrl_c().await {
            signal_clone.shutdown();
        }
    });

    signal
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_signal() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_shutdown());

        signal.shutdown();
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_shutdown() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_returns_if_already_requested() {
        let signal = ShutdownSignal::new();
        signal.shutdown();
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .unwrap();
    }
}
