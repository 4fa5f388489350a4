//! Mount-path routing.
//!
//! The [`Router`] maps normalized mount paths (`/static/`) to handler
//! chains of the form `RequestLogger(ResponseTimeout(Authenticator(handler)))`.
//! A request is dispatched to the longest mount path that prefixes its
//! decoded path. Anything else gets a plain-text `404` that names the requested path.
//!
//! # Example
//!
//! ```rust
//! use otterserve_server::{Authenticator, Route, Router};
//!
//! let mut router = Router::new(Authenticator::NoOp);
//! router
//!     .register_routes(&[Route::new("static", "./public")])
//!     .unwrap();
//!
//! assert_eq!(router.mount_paths().collect::<Vec<_>>(), ["/static/"]);
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use crate::auth::Authenticator;
use crate::error::{plain_text, ServerError};
use crate::handler::{decoded_path, remote_addr, HttpRequest, HttpResponse, SharedHandler};
use crate::request_logger::RequestLogger;
use crate::static_files::{redirect_to_slash, StaticFileHandler};
use crate::timeout::ResponseTimeout;

/// A mount path and the directory served under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// URL prefix. Normalized on registration.
    pub mount_path: String,
    /// Directory served under the prefix.
    pub directory: PathBuf,
}

impl Route {
    /// Creates a route.
    pub fn new(mount_path: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            mount_path: mount_path.into(),
            directory: directory.into(),
        }
    }
}

/// Adds a leading and a trailing `/` when missing.
///
/// Idempotent: normalizing a normalized path returns it unchanged.
///
/// # Example
///
/// ```rust
/// use otterserve_server::normalize_mount_path;
///
/// assert_eq!(normalize_mount_path("static"), "/static/");
/// assert_eq!(normalize_mount_path("/static/"), "/static/");
/// assert_eq!(normalize_mount_path("/"), "/");
/// ```
pub fn normalize_mount_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 2);
    if !path.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(path);
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Result of matching a request path.
pub enum RouteMatch<'a> {
    /// A mounted handler chain.
    Mounted {
        /// Mount path that matched.
        mount_path: &'a str,
        /// Composed handler for that mount.
        handler: &'a SharedHandler,
    },
    /// The path names a mount without its trailing slash.
    Redirect,
    /// No mount path prefixes the request.
    NotFound,
}

struct MountedRoute {
    mount_path: String,
    handler: SharedHandler,
}

/// Routes requests to per-mount handler chains.
pub struct Router {
    routes: Vec<MountedRoute>,
    authenticator: Authenticator,
    timeout: ResponseTimeout,
    logger: RequestLogger,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("mount_paths", &self.mount_paths().collect::<Vec<_>>())
            .field("authenticator", &self.authenticator)
            .field("response_timeout", &self.timeout.limit())
            .finish()
    }
}

impl Router {
    /// Creates an empty router whose mounts are all gated by `authenticator`.
    pub fn new(authenticator: Authenticator) -> Self {
        Self {
            routes: Vec::new(),
            authenticator,
            timeout: ResponseTimeout::default(),
            logger: RequestLogger::new(),
        }
    }

    /// Sets how long a mounted handler may take to respond. Applies to
    /// mounts added after this call.
    #[must_use]
    pub fn with_response_timeout(mut self, limit: Duration) -> Self {
        self.timeout = ResponseTimeout::new(limit);
        self
    }

    /// Registers file-serving routes.
    ///
    /// Every route is validated before any is registered. A later route
    /// with the same normalized mount path replaces an earlier one.
    ///
    /// # Errors
    ///
    /// `NoRoutesConfigured` for an empty list, `InvalidRoute` naming the
    /// first route with an empty mount path or directory.
    pub fn register_routes(&mut self, routes: &[Route]) -> Result<(), ServerError> {
        if routes.is_empty() {
            return Err(ServerError::NoRoutesConfigured);
        }

        for (index, route) in routes.iter().enumerate() {
            if route.mount_path.is_empty() {
                return Err(ServerError::invalid_route(
                    index,
                    &route.mount_path,
                    "route path cannot be empty",
                ));
            }
            if route.directory.as_os_str().is_empty() {
                return Err(ServerError::invalid_route(
                    index,
                    &route.mount_path,
                    "route directory cannot be empty",
                ));
            }
        }

        for route in routes {
            let mount_path = normalize_mount_path(&route.mount_path);
            tracing::info!(
                path = %mount_path,
                directory = %route.directory.display(),
                "Registering route"
            );
            let files = StaticFileHandler::new(mount_path.clone(), route.directory.clone());
            self.insert(mount_path, Arc::new(files));
        }

        Ok(())
    }

    /// Mounts a custom handler behind the same logging and authentication
    /// layers as file routes.
    pub fn mount(&mut self, mount_path: &str, handler: SharedHandler) {
        let mount_path = normalize_mount_path(mount_path);
        tracing::info!(path = %mount_path, "Registering handler");
        self.insert(mount_path, handler);
    }

    fn insert(&mut self, mount_path: String, handler: SharedHandler) {
        let handler = self
            .logger
            .wrap(self.timeout.wrap(self.authenticator.wrap(handler)));

        if let Some(existing) = self.routes.iter_mut().find(|r| r.mount_path == mount_path) {
            tracing::warn!(path = %mount_path, "Replacing previously registered route");
            existing.handler = handler;
        } else {
            self.routes.push(MountedRoute {
                mount_path,
                handler,
            });
        }
    }

    /// Returns the registered mount paths in registration order.
    pub fn mount_paths(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.mount_path.as_str())
    }

    /// Returns the number of registered mounts.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Matches a decoded request path.
    pub fn match_route(&self, path: &str) -> RouteMatch<'_> {
        if !path.ends_with('/')
            && self
                .routes
                .iter()
                .any(|r| r.mount_path.len() == path.len() + 1 && r.mount_path.starts_with(path))
        {
            return RouteMatch::Redirect;
        }

        self.routes
            .iter()
            .filter(|r| path.starts_with(r.mount_path.as_str()))
            .max_by_key(|r| r.mount_path.len())
            .map_or(RouteMatch::NotFound, |r| RouteMatch::Mounted {
                mount_path: &r.mount_path,
                handler: &r.handler,
            })
    }

    /// Dispatches a request.
    pub async fn dispatch(&self, request: HttpRequest) -> HttpResponse {
        let path = match decoded_path(&request) {
            Ok(path) => path.into_owned(),
            Err(err) => return err.into_response(),
        };

        match self.match_route(&path) {
            RouteMatch::Mounted { handler, .. } => handler.call(request).await,
            RouteMatch::Redirect => redirect_to_slash(&request),
            RouteMatch::NotFound => not_found(&request, &path),
        }
    }
}

fn not_found(request: &HttpRequest, path: &str) -> HttpResponse {
    tracing::info!(
        method = %request.method(),
        path = %path,
        remote_addr = ?remote_addr(request),
        "Route not found"
    );

    plain_text(
        StatusCode::NOT_FOUND,
        format!("404 Not Found\n\nThe requested path '{path}' was not found on this server.\n"),
    )
}
