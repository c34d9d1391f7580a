//! Process-wide shutdown coordination
//!
//! Two states, `running` and `stopping`. The transition is one-way and
//! idempotent. The scheduler observes it between ticks; in-flight missions
//! and aggregation runs are allowed to finish.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Cloneable handle to the shared shutdown state
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Move to `stopping`; returns false if shutdown was already requested
    pub fn request(&self, reason: &str) -> bool {
        let changed = self.tx.send_if_modified(|stopping| {
            if *stopping {
                false
            } else {
                *stopping = true;
                true
            }
        });
        if changed {
            info!(reason, "Shutdown requested");
        }
        changed
    }

    pub fn is_stopping(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any coordinator clone, including self
        let _ = rx.wait_for(|stopping| *stopping).await;
    }
}

/// Request shutdown on SIGINT or SIGTERM
pub fn install_signal_handlers(coordinator: ShutdownCoordinator) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let reason = wait_for_signal().await;
            coordinator.request(reason);
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            let interrupt = async { delivered(tokio::signal::ctrl_c().await, "SIGINT received").await };
            let terminate = async {
                let result = sigterm.recv().await.ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::BrokenPipe, "SIGTERM stream closed")
                });
                delivered(result, "SIGTERM received").await
            };
            tokio::select! {
                reason = interrupt => reason,
                reason = terminate => reason,
            }
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            delivered(tokio::signal::ctrl_c().await, "SIGINT received").await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    delivered(tokio::signal::ctrl_c().await, "SIGINT received").await
}

/// Resolve to `reason` for a delivered signal; a broken listener never resolves.
async fn delivered(result: std::io::Result<()>, reason: &'static str) -> &'static str {
    match result {
        Ok(()) => reason,
        Err(e) => {
            warn!(error = %e, "Signal listener failed, no longer watching it");
            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_starts_running() {
        assert!(!ShutdownCoordinator::new().is_stopping());
    }

    #[test]
    fn test_request_is_idempotent() {
        let coordinator = ShutdownCoordinator::new();
        let clone = coordinator.clone();

        assert!(coordinator.request("first"));
        assert!(!clone.request("second"));
        assert!(coordinator.is_stopping());
        assert!(clone.is_stopping());
    }

    #[tokio::test]
    async fn test_stopped_wakes_waiters() {
        let coordinator = ShutdownCoordinator::new();
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.stopped().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator.request("test");

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stopped_returns_immediately_when_already_stopping() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.request("test");
        tokio::time::timeout(Duration::from_millis(100), coordinator.stopped())
            .await
            .expect("already stopping");
    }

    #[tokio::test]
    async fn test_delivered_signal_resolves_with_reason() {
        assert_eq!(delivered(Ok(()), "SIGINT received").await, "SIGINT received");
    }

    #[tokio::test]
    async fn test_failed_listener_never_requests_shutdown() {
        let error = std::io::Error::new(std::io::ErrorKind::Other, "no signal driver");
        let waited =
            tokio::time::timeout(Duration::from_millis(50), delivered(Err(error), "SIGINT received"))
                .await;
        assert!(waited.is_err());
    }
}
