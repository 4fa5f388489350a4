//! Telemetry error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while setting up logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// The configured level is not a known log level.
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// The log file could not be opened for appending.
    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        /// Path of the log file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::LoggingInit("failed".to_string());
        assert_eq!(err.to_string(), "Failed to initialize logging: failed");

        let err = TelemetryError::InvalidLevel("chatty".to_string());
        assert_eq!(err.to_string(), "Invalid log level: chatty");
    }

    #[test]
    fn test_log_file_error_names_path() {
        let err = TelemetryError::LogFile {
            path: PathBuf::from("/nope/otterserve.log"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/nope/otterserve.log"));
    }
}
