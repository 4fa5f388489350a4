//! Structured logging for otterserve.
//!
//! This module installs a `tracing-subscriber` formatter that writes either
//! to standard output or appends to a log file.
//!
//! # Features
//!
//! - Human-readable or JSON output
//! - Configurable log level (`RUST_LOG` takes precedence when set)
//! - Optional file destination, one locked write per record
//!
//! # Example
//!
//! ```rust,ignore
//! use otterserve_telemetry::logging::{LogConfig, init_logging};
//!
//! let config = LogConfig::default();
//! init_logging(&config)?;
//!
//! tracing::info!(request_id = "req-1", path = "/index.html", "Request started");
//! ```

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (`debug`, `info`, `warn` or `error`).
    pub level: String,

    /// File to append to. `None` writes to standard output.
    pub file: Option<PathBuf>,

    /// Whether to output JSON format.
    pub json_format: bool,

    /// Whether to include target (module path).
    pub include_target: bool,

    /// Service name attached to the startup record.
    pub service_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json_format: false,
            include_target: false,
            service_name: "otterserve".to_string(),
        }
    }
}

impl LogConfig {
    /// Creates a development configuration with human-readable output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            include_target: true,
            ..Self::default()
        }
    }

    /// Creates a production configuration with JSON output.
    #[must_use]
    pub fn production() -> Self {
        Self {
            json_format: true,
            include_target: true,
            ..Self::default()
        }
    }

    /// Sets the log level.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the log file. `None` writes to standard output.
    #[must_use]
    pub fn with_file(mut self, file: Option<PathBuf>) -> Self {
        self.file = file;
        self
    }
}

/// Parses a configured level name.
///
/// Accepts `debug`, `info`, `warn`/`warning` and `error`, ignoring case.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidLevel` for any other value.
pub fn parse_level(level: &str) -> TelemetryResult<Level> {
    match level.trim().to_lowercase().as_str() {
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(TelemetryError::InvalidLevel(level.to_string())),
    }
}

/// Creates the filter for the configured level.
///
/// A non-empty `RUST_LOG` overrides the configured level.
///
/// # Errors
///
/// Returns an error if the configured level is unknown or `RUST_LOG`
/// cannot be parsed.
pub fn create_env_filter(level: &str) -> TelemetryResult<EnvFilter> {
    let level = parse_level(level)?;

    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)
            .map_err(|e| TelemetryError::LoggingInit(format!("Invalid RUST_LOG: {e}"))),
        _ => Ok(EnvFilter::new(level.as_str().to_lowercase())),
    }
}

/// Opens a log file for appending, creating it and its directory if needed.
///
/// # Errors
///
/// Returns `TelemetryError::LogFile` if the file cannot be opened.
pub fn open_log_file(path: &Path) -> TelemetryResult<File> {
    let log_file_error = |source| TelemetryError::LogFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(log_file_error)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_file_error)
}

fn make_writer(config: &LogConfig) -> TelemetryResult<BoxMakeWriter> {
    match &config.file {
        Some(path) => Ok(BoxMakeWriter::new(Mutex::new(open_log_file(path)?))),
        None => Ok(BoxMakeWriter::new(std::io::stdout)),
    }
}

/// Initializes the logging subsystem.
///
/// # Errors
///
/// Returns `TelemetryError` if the level is invalid, the log file cannot be
/// opened, or a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = create_env_filter(&config.level)?;
    let writer = make_writer(config)?;
    let ansi = config.file.is_none();

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::debug!(
        service = %config.service_name,
        level = %config.level,
        file = ?config.file,
        "Logging initialized"
    );

    Ok(())
}

/// Standard log fields for otterserve.
///
/// Use these field names for consistency across logs.
pub mod fields {
    /// Request ID field name.
    pub const REQUEST_ID: &str = "request_id";

    /// HTTP method field name.
    pub const METHOD: &str = "method";

    /// Request path field name.
    pub const PATH: &str = "path";

    /// Remote address field name.
    pub const REMOTE_ADDR: &str = "remote_addr";

    /// User agent field name.
    pub const USER_AGENT: &str = "user_agent";

    /// HTTP status code field name.
    pub const STATUS_CODE: &str = "status_code";

    /// Duration field name (in milliseconds).
    pub const DURATION_MS: &str = "duration_ms";

    /// Response body size field name.
    pub const BYTES: &str = "bytes";

    /// Error field name.
    pub const ERROR: &str = "error";
}
