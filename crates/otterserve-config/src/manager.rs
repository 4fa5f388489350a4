//! Configuration file management.
//!
//! [`ConfigManager`] is the seam the binary uses to read, write and check
//! the configuration file. [`YamlConfigManager`] is the file-backed
//! implementation.

use std::fs;
use std::path::Path;

use crate::{ConfigError, ConfigLoader, OtterserveConfig, DEFAULT_ENV_PREFIX};

/// Configuration management operations.
pub trait ConfigManager {
    /// Reads and parses a configuration file.
    fn load(&self, path: &Path) -> Result<OtterserveConfig, ConfigError>;

    /// Writes a configuration file, creating parent directories.
    fn save(&self, config: &OtterserveConfig, path: &Path) -> Result<(), ConfigError>;

    /// Checks a configuration for structural correctness.
    fn validate(&self, config: &OtterserveConfig) -> Result<(), ConfigError>;

    /// Loads the file, or writes and returns the default configuration when
    /// the file does not exist yet.
    fn load_or_create_default(&self, path: &Path) -> Result<OtterserveConfig, ConfigError>;
}

/// YAML file backed [`ConfigManager`].
///
/// # Example
///
/// ```no_run
/// use otterserve_config::{ConfigManager, YamlConfigManager};
/// use std::path::Path;
///
/// # fn main() -> Result<(), otterserve_config::ConfigError> {
/// let manager = YamlConfigManager::new();
/// let config = manager.load_or_create_default(Path::new("config.yaml"))?;
/// manager.validate(&config)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct YamlConfigManager {
    env_prefix: Option<String>,
}

impl YamlConfigManager {
    /// Creates a manager that reads files only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager that also applies `OTTERSERVE__*` environment overrides.
    #[must_use]
    pub fn with_env_overrides() -> Self {
        Self {
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
        }
    }

    fn loader(&self) -> ConfigLoader {
        match &self.env_prefix {
            Some(prefix) => ConfigLoader::new().with_env_prefix(prefix),
            None => ConfigLoader::new(),
        }
    }

    fn create_default_directories(config: &OtterserveConfig) -> Result<(), ConfigError> {
        for route in &config.routes {
            fs::create_dir_all(&route.directory)
                .map_err(|e| ConfigError::write_error(&route.directory, e))?;
        }
        Ok(())
    }
}

impl ConfigManager for YamlConfigManager {
    fn load(&self, path: &Path) -> Result<OtterserveConfig, ConfigError> {
        self.loader().with_file(path)?.load_unvalidated()
    }

    fn save(&self, config: &OtterserveConfig, path: &Path) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(config)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConfigError::write_error(parent, e))?;
        }

        fs::write(path, yaml).map_err(|e| ConfigError::write_error(path, e))
    }

    fn validate(&self, config: &OtterserveConfig) -> Result<(), ConfigError> {
        config.validate()
    }

    fn load_or_create_default(&self, path: &Path) -> Result<OtterserveConfig, ConfigError> {
        match self.load(path) {
            Ok(config) => Ok(config),
            Err(err) if err.is_not_found() => {
                tracing::info!(
                    path = %path.display(),
                    "Configuration file not found, writing defaults"
                );
                let config = self.loader().load_unvalidated()?;
                Self::create_default_directories(&config)?;
                self.save(&config, path)?;
                Ok(config)
            }
            Err(err) => Err(err),
        }
    }
}
