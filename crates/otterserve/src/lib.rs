//! # Otterserve
//!
//! The otterserve daemon: command-line parsing, the foreground console
//! runner and systemd service registration around the
//! [`otterserve_server`] core.
//!
//! ```text
//! config.yaml ─► otterserve-config ─► ServerConfig ─► LifecycleManager
//!                      │                                   │
//!                      └──► otterserve-telemetry      Server::start / stop
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod runner;
pub mod service;

pub use cli::{Action, Cli};
pub use runner::{log_config, server_config, ConsoleRunner};
pub use service::{
    CommandRunner, ServiceDefinition, ServiceError, ServiceManager, ServiceStatus,
    SystemCommandRunner, SystemdServiceManager,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name the service is registered under.
pub const SERVICE_NAME: &str = "otterserve";
