//! Typed configuration for otterserve.
//!
//! This crate provides the configuration provider for the otterserve file
//! server with support for:
//! - YAML configuration files
//! - Environment variable overrides
//! - Defaults for values a partial file leaves out
//! - Structural validation before the server starts
//!
//! # Example
//!
//! ```no_run
//! use otterserve_config::{ConfigManager, YamlConfigManager};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), otterserve_config::ConfigError> {
//! let manager = YamlConfigManager::with_env_overrides();
//! let config = manager.load_or_create_default(Path::new("config.yaml"))?;
//! manager.validate(&config)?;
//!
//! println!("Server will listen on: {}:{}", config.server.host, config.server.port);
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden via environment variables using the format
//! `OTTERSERVE__SECTION__KEY`, for example `OTTERSERVE__SERVER__PORT=8080`
//! or `OTTERSERVE__LOGGING__LEVEL=debug`.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod manager;

pub use config::{
    AuthSection, LoggingSection, OtterserveConfig, RouteConfig, ServerSection, DEFAULT_HOST,
    DEFAULT_LOG_LEVEL, DEFAULT_PORT, VALID_LOG_LEVELS,
};
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use manager::{ConfigManager, YamlConfigManager};
