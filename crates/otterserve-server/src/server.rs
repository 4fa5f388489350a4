//! HTTP server implementation.
//!
//! The server owns the listener and moves through
//! `Created → Starting → Running → Stopping → Stopped`:
//!
//! - [`Server::start`] builds the router, binds the listener and spawns the
//!   accept loop. Port `0` binds any free port; [`Server::bound_addr`]
//!   reports the one chosen.
//! - [`Server::stop`] stops accepting, asks every connection to finish its
//!   current request, and waits up to a deadline. Connections still open
//!   after the deadline are closed and the overrun is reported as an error.
//!
//! A connection is dropped when its request headers take longer than
//! `read_timeout`. It is also dropped when a socket write stalls past
//! `write_timeout` or the connection sits idle past `idle_timeout`.
//!
//! # Example
//!
//! ```rust,ignore
//! use otterserve_server::{Server, ServerConfig};
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .host("127.0.0.1")
//!     .port(0)
//!     .route("/static", "./public")
//!     .build();
//!
//! let mut server = Server::new(config);
//! let addr = server.start().await?;
//! println!("listening on {addr}");
//! server.stop(Duration::from_secs(30)).await?;
//! ```

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::{HttpResponse, RemoteAddr, SharedHandler};
use crate::router::Router;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::stream::TimeoutStream;

/// How long forcibly closed connections get to unwind after the deadline.
const ABORT_GRACE: Duration = Duration::from_secs(1);

/// Pause after a failed accept, so resource exhaustion does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Lifecycle state of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, not started.
    Created,
    /// `start` is in progress.
    Starting,
    /// Accepting connections.
    Running,
    /// `stop` is in progress.
    Stopping,
    /// Terminal.
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// State shared by every connection task.
struct ConnectionContext {
    router: Router,
    read_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
}

impl ConnectionContext {
    async fn handle(&self, request: Request<Incoming>, remote_addr: SocketAddr) -> HttpResponse {
        // Request bodies are never read
        let (parts, _body) = request.into_parts();
        let mut request = Request::from_parts(parts, ());
        request.extensions_mut().insert(RemoteAddr(remote_addr));

        self.router.dispatch(request).await
    }
}

/// The otterserve HTTP server.
pub struct Server {
    config: ServerConfig,
    extra_mounts: Vec<(String, SharedHandler)>,
    state: ServerState,
    bound_addr: Option<SocketAddr>,
    shutdown: ShutdownSignal,
    abort: ShutdownSignal,
    tracker: ConnectionTracker,
    accept_task: Option<JoinHandle<()>>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("bound_addr", &self.bound_addr)
            .field("active_connections", &self.tracker.active_connections())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a server in the `Created` state.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            extra_mounts: Vec::new(),
            state: ServerState::Created,
            bound_addr: None,
            shutdown: ShutdownSignal::new(),
            abort: ShutdownSignal::new(),
            tracker: ConnectionTracker::new(),
            accept_task: None,
        }
    }

    /// Mounts a custom handler next to the configured file routes.
    ///
    /// It sits behind the same logging and authentication layers.
    #[must_use]
    pub fn with_handler(mut self, mount_path: impl Into<String>, handler: SharedHandler) -> Self {
        self.extra_mounts.push((mount_path.into(), handler));
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the address actually bound, from `Running` onward.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    /// Returns the number of open connections.
    pub fn active_connections(&self) -> usize {
        self.tracker.active_connections()
    }

    /// Registers routes, binds the listener and starts accepting.
    ///
    /// A failed start leaves the server `Stopped`.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `Created`, `NoRoutesConfigured` or
    /// `InvalidRoute` for a rejected route table, `Bind` if the listener
    /// cannot be bound.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        self.expect_state(ServerState::Created)?;
        self.state = ServerState::Starting;

        match self.bind_and_spawn().await {
            Ok(addr) => {
                self.bound_addr = Some(addr);
                self.state = ServerState::Running;
                Ok(addr)
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to start HTTP server");
                self.state = ServerState::Stopped;
                Err(err)
            }
        }
    }

    async fn bind_and_spawn(&mut self) -> Result<SocketAddr, ServerError> {
        let authenticator = Authenticator::from_policy(self.config.auth(), self.config.realm());
        let auth_enabled = authenticator.is_enabled();

        let mut router =
            Router::new(authenticator).with_response_timeout(self.config.response_timeout());
        router.register_routes(self.config.routes())?;
        for (mount_path, handler) in &self.extra_mounts {
            router.mount(mount_path, Arc::clone(handler));
        }

        let bind_addr = self.config.bind_addr();
        let bind_error = |source| ServerError::Bind {
            addr: bind_addr.clone(),
            source,
        };

        let listener = TcpListener::bind((self.config.host(), self.config.port()))
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        tracing::info!(
            address = %local_addr,
            routes = router.len(),
            auth_enabled,
            "HTTP server started"
        );

        let context = Arc::new(ConnectionContext {
            router,
            read_timeout: self.config.read_timeout(),
            write_timeout: self.config.write_timeout(),
            idle_timeout: self.config.idle_timeout(),
        });

        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            context,
            self.shutdown.clone(),
            self.abort.clone(),
            self.tracker.clone(),
        )));

        Ok(local_addr)
    }

    /// Stops accepting and drains open connections.
    ///
    /// The server is `Stopped` when this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `Running`; `ShutdownTimeout` if connections
    /// were still open at the deadline and had to be closed.
    pub async fn stop(&mut self, deadline: Duration) -> Result<(), ServerError> {
        self.expect_state(ServerState::Running)?;
        self.state = ServerState::Stopping;

        tracing::info!(
            deadline = ?deadline,
            active_connections = self.tracker.active_connections(),
            "Stopping HTTP server"
        );

        self.shutdown.trigger();

        let accept_task = self.accept_task.take();
        let tracker = self.tracker.clone();
        let drained = tokio::time::timeout(deadline, async move {
            if let Some(task) = accept_task {
                if let Err(e) = task.await {
                    tracing::error!(error = %e, "Accept loop terminated abnormally");
                }
            }
            tracker.wait_for_shutdown().await;
        })
        .await
        .is_ok();

        let result = if drained {
            tracing::info!("HTTP server stopped");
            Ok(())
        } else {
            let remaining = self.tracker.active_connections();
            tracing::warn!(
                remaining,
                "Shutdown deadline exceeded, closing remaining connections"
            );
            self.abort.trigger();
            let _ = tokio::time::timeout(ABORT_GRACE, self.tracker.wait_for_shutdown()).await;
            Err(ServerError::ShutdownTimeout {
                deadline,
                remaining,
            })
        };

        self.state = ServerState::Stopped;
        result
    }

    fn expect_state(&self, expected: ServerState) -> Result<(), ServerError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ServerError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.trigger();
        self.abort.trigger();
    }
}

async fn accept_loop(
    listener: TcpListener,
    context: Arc<ConnectionContext>,
    shutdown: ShutdownSignal,
    abort: ShutdownSignal,
    tracker: ConnectionTracker,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, remote_addr)) => {
                        let token = tracker.acquire();
                        let context = Arc::clone(&context);
                        let shutdown = shutdown.clone();
                        let abort = abort.clone();

                        tokio::spawn(async move {
                            serve_connection(stream, remote_addr, context, shutdown, abort).await;
                            drop(token);
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }

            _ = shutdown.recv() => {
                tracing::info!("Stopped accepting connections");
                break;
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    context: Arc<ConnectionContext>,
    shutdown: ShutdownSignal,
    abort: ShutdownSignal,
) {
    let io = TokioIo::new(TimeoutStream::new(
        stream,
        context.idle_timeout,
        context.write_timeout,
    ));
    let service_context = Arc::clone(&context);

    let service = service_fn(move |request: Request<Incoming>| {
        let context = Arc::clone(&service_context);
        async move { Ok::<_, Infallible>(context.handle(request, remote_addr).await) }
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(context.read_timeout)
        .serve_connection(io, service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(remote_addr = %remote_addr, error = %e, "Connection error");
                }
                break;
            }

            _ = shutdown.recv(), if !draining => {
                // Finish the in-flight request, then close
                conn.as_mut().graceful_shutdown();
                draining = true;
            }

            _ = abort.recv() => {
                tracing::debug!(remote_addr = %remote_addr, "Connection closed after shutdown deadline");
                break;
            }
        }
    }
}
