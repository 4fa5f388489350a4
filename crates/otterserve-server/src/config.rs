//! Server configuration types.
//!
//! # Example
//!
//! ```rust
//! use otterserve_server::{AuthPolicy, ServerConfig};
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .host("127.0.0.1")
//!     .port(0)
//!     .route("/static", "./public")
//!     .auth(AuthPolicy::basic("admin", "secret"))
//!     .shutdown_timeout(Duration::from_secs(10))
//!     .build();
//!
//! assert_eq!(config.bind_addr(), "127.0.0.1:0");
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{AuthPolicy, DEFAULT_REALM};
use crate::router::Route;

/// Default bind host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 1123;

/// Default request-header read timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Default time a handler may take to produce a response, in seconds.
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 30;

/// Default limit for a single stalled socket write, in seconds.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 30;

/// Default idle keep-alive limit in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    host: String,
    port: u16,
    routes: Vec<Route>,
    auth: AuthPolicy,
    realm: String,
    read_timeout: Duration,
    response_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the bind host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the bind port. `0` picks any free port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns `host:port` as configured.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Returns the configured routes.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Returns the authentication policy.
    #[must_use]
    pub fn auth(&self) -> &AuthPolicy {
        &self.auth
    }

    /// Returns the Basic auth realm.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Returns the limit for reading request headers.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Returns how long a handler may take to produce a response.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Returns how long a socket write may stall before the connection
    /// is dropped.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Returns how long a connection may sit without traffic.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Returns how long shutdown waits for open connections.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    host: String,
    port: u16,
    routes: Vec<Route>,
    auth: AuthPolicy,
    realm: String,
    read_timeout: Duration,
    response_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    shutdown_timeout: Duration,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            routes: Vec::new(),
            auth: AuthPolicy::disabled(),
            realm: DEFAULT_REALM.to_string(),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        }
    }

    /// Sets the bind host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the bind port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Appends a route.
    #[must_use]
    pub fn route(mut self, mount_path: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        self.routes.push(Route::new(mount_path, directory));
        self
    }

    /// Replaces all routes.
    #[must_use]
    pub fn routes(mut self, routes: Vec<Route>) -> Self {
        self.routes = routes;
        self
    }

    /// Sets the authentication policy.
    #[must_use]
    pub fn auth(mut self, auth: AuthPolicy) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the Basic auth realm.
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Sets the request-header read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the handler response timeout.
    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Sets the stalled socket write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            routes: self.routes,
            auth: self.auth,
            realm: self.realm,
            read_timeout: self.read_timeout,
            response_timeout: self.response_timeout,
            write_timeout: self.write_timeout,
            idle_timeout: self.idle_timeout,
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
