//! Start-wait-stop driver for a [`Server`].
//!
//! [`LifecycleManager::run`] starts the server, blocks until the shutdown
//! signal fires, then stops the server with a bounded deadline.
//!
//! # Example
//!
//! ```rust,ignore
//! use otterserve_server::{LifecycleManager, Server, ShutdownSignal};
//!
//! let manager = LifecycleManager::new(Server::new(config))
//!     .on_started(|addr| println!("listening on http://{addr}"));
//!
//! manager.run(ShutdownSignal::with_os_signals()).await?;
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ServerError;
use crate::server::Server;
use crate::shutdown::ShutdownSignal;

/// Callback invoked once the listener is bound.
pub type StartedHook = Box<dyn FnOnce(SocketAddr) + Send>;

/// Runs a server until shutdown is requested.
pub struct LifecycleManager {
    server: Server,
    stop_deadline: Duration,
    on_started: Option<StartedHook>,
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("server", &self.server)
            .field("stop_deadline", &self.stop_deadline)
            .field("on_started", &self.on_started.is_some())
            .finish()
    }
}

impl LifecycleManager {
    /// Wraps a server. The stop deadline defaults to its shutdown timeout.
    pub fn new(server: Server) -> Self {
        let stop_deadline = server.config().shutdown_timeout();
        Self {
            server,
            stop_deadline,
            on_started: None,
        }
    }

    /// Overrides the stop deadline.
    #[must_use]
    pub fn with_stop_deadline(mut self, deadline: Duration) -> Self {
        self.stop_deadline = deadline;
        self
    }

    /// Registers a callback that receives the bound address.
    #[must_use]
    pub fn on_started<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(SocketAddr) + Send + 'static,
    {
        self.on_started = Some(Box::new(hook));
        self
    }

    /// Returns the stop deadline.
    pub fn stop_deadline(&self) -> Duration {
        self.stop_deadline
    }

    /// Returns the managed server.
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Starts the server, waits for `shutdown`, then stops it.
    ///
    /// # Errors
    ///
    /// Any start error, or the stop error (for example a deadline overrun).
    pub async fn run(mut self, shutdown: ShutdownSignal) -> Result<Server, ServerError> {
        let addr = self.server.start().await?;

        if let Some(hook) = self.on_started.take() {
            hook(addr);
        }

        shutdown.recv().await;
        tracing::info!("Shutdown requested");

        self.server.stop(self.stop_deadline).await?;
        Ok(self.server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::server::ServerState;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    fn server(dir: &TempDir) -> Server {
        Server::new(
            ServerConfig::builder()
                .host("127.0.0.1")
                .port(0)
                .route("/", dir.path())
                .shutdown_timeout(Duration::from_secs(12))
                .build(),
        )
    }

    #[test]
    fn test_stop_deadline_defaults_to_shutdown_timeout() {
        let dir = TempDir::new().unwrap();
        let manager = LifecycleManager::new(server(&dir));
        assert_eq!(manager.stop_deadline(), Duration::from_secs(12));

        let manager = manager.with_stop_deadline(Duration::from_secs(3));
        assert_eq!(manager.stop_deadline(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_run_until_signal() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = oneshot::channel();
        let shutdown = ShutdownSignal::new();

        let manager = LifecycleManager::new(server(&dir)).on_started(move |addr| {
            let _ = tx.send(addr);
        });
        let handle = tokio::spawn(manager.run(shutdown.clone()));

        let addr = rx.await.unwrap();
        assert!(tokio::net::TcpStream::connect(addr).await.is_ok());

        shutdown.trigger();
        let server = handle.await.unwrap().unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_run_surfaces_start_error() {
        let manager = LifecycleManager::new(Server::new(
            ServerConfig::builder().host("127.0.0.1").port(0).build(),
        ));

        let result = manager.run(ShutdownSignal::new()).await;
        assert!(matches!(result, Err(ServerError::NoRoutesConfigured)));
    }
}
