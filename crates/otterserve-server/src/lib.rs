//! # Otterserve Server
//!
//! The request pipeline and lifecycle of the otterserve file server.
//!
//! Each configured route maps a URL prefix to a directory. A request is
//! matched to the longest prefix, logged, given a response deadline,
//! authenticated, and answered by the route's [`StaticFileHandler`]:
//!
//! ```text
//! request ─► Router ─► RequestLogger ─► ResponseTimeout ─► Authenticator ─► StaticFileHandler
//!                                                                          ├─ file (Range, conditional)
//!                                                                          ├─ index.html / index.htm / default.html
//!                                                                          └─ generated listing
//! ```
//!
//! [`Server`] owns the listener and the `Created → Running → Stopped`
//! state machine; [`LifecycleManager`] drives it from a [`ShutdownSignal`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use otterserve_server::{LifecycleManager, Server, ServerConfig, ShutdownSignal};
//!
//! let config = ServerConfig::builder()
//!     .host("127.0.0.1")
//!     .port(8080)
//!     .route("/static", "./public")
//!     .build();
//!
//! LifecycleManager::new(Server::new(config))
//!     .run(ShutdownSignal::with_os_signals())
//!     .await?;
//! ```

#![doc(html_root_url = "https://docs.rs/otterserve-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod content_type;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod listing;
pub mod path;
pub mod request_logger;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod static_files;
pub mod stream;
pub mod timeout;

pub use auth::{AuthPolicy, Authenticator, BasicAuthenticator, DEFAULT_REALM};
pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{ServeError, ServerError};
pub use handler::{handler_fn, Handler, HttpRequest, HttpResponse, RemoteAddr, SharedHandler};
pub use lifecycle::LifecycleManager;
pub use listing::DirectoryEntry;
pub use path::{PathResolver, ResolvedTarget};
pub use request_logger::{RequestContext, RequestLogger};
pub use router::{normalize_mount_path, Route, RouteMatch, Router};
pub use server::{Server, ServerState};
pub use shutdown::ShutdownSignal;
pub use static_files::StaticFileHandler;
pub use timeout::ResponseTimeout;
