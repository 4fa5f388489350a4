//! Shutdown coordination.
//!
//! [`ShutdownSignal`] is a cloneable, trigger-once flag that any number of
//! tasks can await. [`ConnectionTracker`] counts live connections so the
//! server can wait for them to drain before it reports itself stopped.
//!
//! # Example
//!
//! ```rust
//! use otterserve_server::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! let observer = shutdown.clone();
//!
//! shutdown.trigger();
//! assert!(observer.is_shutdown());
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{broadcast, Notify};

/// Fires once; every clone observes it.
///
/// Clones share state: triggering any clone wakes every waiter.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    /// Creates a new, untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            sender,
        }
    }

    /// Triggers the signal. Repeated calls are no-ops.
    pub fn trigger(&self) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // No receivers is fine
            let _ = self.sender.send(());
        }
    }

    /// Returns `true` once the signal has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Returns a future that completes when the signal is triggered.
    ///
    /// Completes immediately if the signal already fired.
    pub fn recv(&self) -> ShutdownReceiver {
        // Subscribe before reading the flag: a trigger in between is
        // either seen in the flag or delivered on the channel.
        let mut receiver = self.sender.subscribe();
        let triggered = Arc::clone(&self.triggered);

        ShutdownReceiver {
            inner: Box::pin(async move {
                if !triggered.load(Ordering::SeqCst) {
                    let _ = receiver.recv().await;
                }
            }),
        }
    }

    /// Creates a signal that fires on SIGTERM or SIGINT (Ctrl+C elsewhere).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let signal_clone = signal.clone();

        tokio::spawn(async move {
            wait_for_os_signal().await;
            signal_clone.trigger();
        });

        signal
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once its [`ShutdownSignal`] fires. See [`ShutdownSignal::recv`].
pub struct ShutdownReceiver {
    inner: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl fmt::Debug for ShutdownReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownReceiver").finish_non_exhaustive()
    }
}

impl Future for ShutdownReceiver {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

/// Waits for SIGTERM or SIGINT on Unix, Ctrl+C elsewhere.
async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "Failed to register signal handlers");
                    wait_for_ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

/// Counts live connections.
///
/// # Example
///
/// ```rust
/// use otterserve_server::shutdown::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
///
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Registers a connection. It stays counted until the token is dropped.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until every token has been dropped.
    pub async fn wait_for_shutdown(&self) {
        loop {
            // Register before checking so a drop in between is not missed
            let notified = self.notify.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A live connection. Dropping it decrements the tracker.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_trigger_is_observed_by_every_clone() {
        let server_side = ShutdownSignal::new();
        let accept_loop = server_side.clone();
        let connection = server_side.clone();

        assert!(!accept_loop.is_shutdown());
        server_side.trigger();
        server_side.trigger();

        assert!(accept_loop.is_shutdown());
        assert!(connection.is_shutdown());
    }

    #[test]
    fn test_receiver_pending_until_triggered() {
        let signal = ShutdownSignal::new();
        let mut recv = task::spawn(signal.recv());
        assert_pending!(recv.poll());

        signal.trigger();
        assert!(recv.is_woken());
        assert_ready!(recv.poll());
    }

    #[test]
    fn test_receiver_created_after_trigger_is_ready() {
        let signal = ShutdownSignal::default();
        signal.trigger();

        let mut late = task::spawn(signal.recv());
        assert_ready!(late.poll());
    }

    #[tokio::test]
    async fn test_trigger_from_another_task() {
        let signal = ShutdownSignal::new();
        let remote = signal.clone();

        tokio::spawn(async move { remote.trigger() });

        tokio::time::timeout(std::time::Duration::from_secs(1), signal.recv())
            .await
            .unwrap();
    }

    #[test]
    fn test_tokens_track_open_connections() {
        let tracker = ConnectionTracker::default();
        let tokens: Vec<_> = (0..3).map(|_| tracker.acquire()).collect();
        assert_eq!(tracker.active_connections(), 3);

        drop(tokens);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[test]
    fn test_drain_completes_immediately_when_idle() {
        let tracker = ConnectionTracker::new();
        let mut drain = task::spawn(tracker.wait_for_shutdown());
        assert_ready!(drain.poll());
    }

    #[test]
    fn test_drain_waits_for_last_connection() {
        let tracker = ConnectionTracker::new();
        let keep_alive = tracker.acquire();
        let in_flight = tracker.acquire();

        let mut drain = task::spawn(tracker.wait_for_shutdown());
        assert_pending!(drain.poll());

        drop(keep_alive);
        assert_pending!(drain.poll());

        drop(in_flight);
        assert!(drain.is_woken());
        assert_ready!(drain.poll());
    }
}
