//! Graceful shutdown coordinator.
//!
//! Ctrl-C or `SIGTERM` cancels a shared `CancellationToken`: listeners stop
//! accepting, open sockets close themselves, and the coordinator waits for
//! the last `ConnectionGuard` to drop (bounded by the drain timeout).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Why shutdown was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Ctrl-C / SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
}

/// Tracks one open connection for drain coordination.
///
/// The counter is decremented when the guard drops.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let prev = self.counter.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }
}

/// Coordinator for graceful shutdown with connection draining.
pub struct GracefulShutdown {
    /// Cancelled when listeners and sockets should wind down.
    stop: CancellationToken,

    /// Open connection counter.
    connection_count: Arc<AtomicUsize>,

    /// Notified when the last connection drains.
    drain_notify: Arc<Notify>,

    drain_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            stop: CancellationToken::new(),
            connection_count: Arc::new(AtomicUsize::new(0)),
            drain_notify: Arc::new(Notify::new()),
            drain_timeout,
        }
    }

    /// Token that fires when the server starts shutting down.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Register an open connection.
    pub fn connection_guard(&self) -> ConnectionGuard {
        self.connection_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            counter: Arc::clone(&self.connection_count),
            notify: Arc::clone(&self.drain_notify),
        }
    }

    /// Number of connections still open.
    pub fn active_connections(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// Wait for Ctrl-C or SIGTERM.
    pub async fn wait_for_signal(&self) -> ShutdownSignal {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => return ShutdownSignal::Interrupt,
                        _ = sigterm.recv() => return ShutdownSignal::Terminate,
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to register SIGTERM handler, listening for Ctrl-C only");
                }
            }
        }

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            // Without a signal source the server only stops when triggered
            self.stop.cancelled().await;
        }
        ShutdownSignal::Interrupt
    }

    /// Start shutting down programmatically.
    pub fn trigger_stop(&self) {
        self.stop.cancel();
    }

    /// Wait for all connections to close, or the drain timeout.
    ///
    /// Returns `true` if every connection closed in time.
    pub async fn drain(&self) -> bool {
        let active = self.active_connections();
        if active == 0 {
            info!("No open connections, drain complete");
            return true;
        }

        info!(
            active_connections = active,
            timeout_secs = self.drain_timeout.as_secs(),
            "Draining open connections"
        );

        tokio::select! {
            _ = self.wait_for_drain() => {
                info!("All connections drained cleanly");
                true
            }
            _ = tokio::time::sleep(self.drain_timeout) => {
                warn!(
                    remaining_connections = self.active_connections(),
                    timeout_secs = self.drain_timeout.as_secs(),
                    "Drain timeout expired"
                );
                false
            }
        }
    }

    async fn wait_for_drain(&self) {
        loop {
            let notified = self.drain_notify.notified();
            if self.connection_count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait for a signal, then cancel the stop token.
    pub async fn watch_signals(&self) -> ShutdownSignal {
        let signal = self.wait_for_signal().await;
        info!(signal = ?signal, "Shutdown signal received, stopping listeners");
        self.trigger_stop();
        signal
    }
}
