//! Logging setup for otterserve.
//!
//! The server crates only emit records through the `tracing` macros. This
//! crate decides where those records go:
//!
//! - **Level**: `debug`, `info`, `warn` or `error`, overridable with `RUST_LOG`
//! - **Destination**: standard output, or a file opened in append mode
//! - **Format**: human-readable lines or one JSON object per record
//!
//! # Example
//!
//! ```rust,ignore
//! use otterserve_telemetry::{init_logging, LogConfig};
//!
//! let config = LogConfig::default()
//!     .with_level("debug")
//!     .with_file(Some("otterserve.log".into()));
//!
//! init_logging(&config)?;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{init_logging, parse_level, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
