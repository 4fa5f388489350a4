//! Errors raised while reading, writing or checking `config.yaml`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Configuration failure.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file does not exist.
    #[error("config file {path} does not exist")]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read config file {path}")]
    ReadError {
        /// File path.
        path: PathBuf,
        /// I/O cause.
        #[source]
        source: io::Error,
    },

    /// The file or one of the route directories could not be written.
    #[error("cannot write {path}")]
    WriteError {
        /// File or directory path.
        path: PathBuf,
        /// I/O cause.
        #[source]
        source: io::Error,
    },

    /// The document is not valid YAML or does not match the schema.
    #[error("malformed YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A single field holds a value the server cannot use.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted field name, e.g. `auth.username`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An `OTTERSERVE__*` variable could not be converted.
    #[error("environment variable {var}: {reason}")]
    EnvParseError {
        /// Variable name.
        var: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A structural problem spanning fields, such as an empty route table.
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

impl ConfigError {
    /// Builds [`ConfigError::FileNotFound`].
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Builds [`ConfigError::ReadError`].
    pub fn read_error(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Builds [`ConfigError::WriteError`].
    pub fn write_error(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::WriteError {
            path: path.into(),
            source,
        }
    }

    /// Builds [`ConfigError::InvalidValue`].
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Builds [`ConfigError::EnvParseError`].
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Builds [`ConfigError::ValidationError`].
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// Whether the configuration file is missing, in which case defaults
    /// are written instead.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::FileNotFound { .. } => true,
            Self::ReadError { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
