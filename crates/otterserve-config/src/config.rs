//! Configuration document types.
//!
//! This module provides the top-level [`OtterserveConfig`] struct, its
//! sections, the default configuration and structural validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Default host the server binds to.
pub const DEFAULT_HOST: &str = "localhost";

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 1123;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log levels accepted by [`OtterserveConfig::validate`].
pub const VALID_LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// Complete otterserve configuration.
///
/// This is the root of the YAML document:
///
/// ```yaml
/// server:
///   host: localhost
///   port: 1123
/// auth:
///   enabled: false
///   username: ""
///   password: ""
/// routes:
///   - path: /
///     directory: ./
/// logging:
///   level: info
///   file: ""
/// ```
///
/// # Example
///
/// ```
/// use otterserve_config::OtterserveConfig;
///
/// let config = OtterserveConfig::default();
/// assert_eq!(config.server.port, 1123);
/// assert_eq!(config.routes.len(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OtterserveConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Basic authentication settings.
    #[serde(default)]
    pub auth: AuthSection,

    /// URL prefix to directory mappings.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSection {
    /// Host name or IP address to bind.
    #[serde(default)]
    pub host: String,

    /// TCP port. `0` asks the OS for any free port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Single-credential basic authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSection {
    /// Whether requests must carry valid credentials.
    #[serde(default)]
    pub enabled: bool,

    /// Expected user name.
    #[serde(default)]
    pub username: String,

    /// Expected password.
    #[serde(default)]
    pub password: String,
}

/// A URL prefix served from a directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Mount path, e.g. `/static`.
    #[serde(default)]
    pub path: String,

    /// Backing directory, absolute or relative to the working directory.
    #[serde(default)]
    pub directory: String,
}

impl RouteConfig {
    /// Creates a route mapping.
    pub fn new(path: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            directory: directory.into(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingSection {
    /// One of `debug`, `info`, `warn`, `error`.
    #[serde(default)]
    pub level: String,

    /// Log file path. Empty means standard output.
    #[serde(default)]
    pub file: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: String::new(),
        }
    }
}

impl LoggingSection {
    /// Returns the log file path, or `None` when logging to standard output.
    pub fn file_path(&self) -> Option<PathBuf> {
        if self.file.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.file))
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for OtterserveConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            auth: AuthSection::default(),
            routes: vec![RouteConfig::new("/", "./")],
            logging: LoggingSection::default(),
        }
    }
}

impl OtterserveConfig {
    /// Fills in values left empty by a partial configuration file.
    ///
    /// Port `0` is a legal value and is never replaced.
    pub fn apply_defaults(&mut self) {
        let defaults = Self::default();

        if self.server.host.is_empty() {
            self.server.host = defaults.server.host;
        }
        if self.logging.level.is_empty() {
            self.logging.level = defaults.logging.level;
        }
        if self.routes.is_empty() {
            self.routes = defaults.routes;
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` or `ConfigError::ValidationError` if:
    /// - The host is empty
    /// - Authentication is enabled without a username or password
    /// - No routes are configured
    /// - A route has an empty path or directory, or its directory does not exist
    /// - The log level is not one of `debug`, `info`, `warn`, `error`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::invalid_value("server.host", "cannot be empty"));
        }

        if self.auth.enabled {
            if self.auth.username.is_empty() {
                return Err(ConfigError::invalid_value(
                    "auth.username",
                    "cannot be empty when auth is enabled",
                ));
            }
            if self.auth.password.is_empty() {
                return Err(ConfigError::invalid_value(
                    "auth.password",
                    "cannot be empty when auth is enabled",
                ));
            }
        }

        if self.routes.is_empty() {
            return Err(ConfigError::validation_error(
                "at least one route must be configured",
            ));
        }

        for (index, route) in self.routes.iter().enumerate() {
            if route.path.is_empty() {
                return Err(ConfigError::validation_error(format!(
                    "route {index}: path cannot be empty"
                )));
            }
            if route.directory.is_empty() {
                return Err(ConfigError::validation_error(format!(
                    "route {index}: directory cannot be empty"
                )));
            }
            if !Path::new(&route.directory).exists() {
                return Err(ConfigError::validation_error(format!(
                    "route {index}: directory {} does not exist",
                    route.directory
                )));
            }
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!(
                    "invalid log level {}, must be one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }

        Ok(())
    }
}
