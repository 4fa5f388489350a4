//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, a YAML file, and environment variables.

use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, OtterserveConfig};

/// Default prefix for environment variable overrides.
pub const DEFAULT_ENV_PREFIX: &str = "OTTERSERVE";

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (YAML)
/// 3. Environment variables
///
/// Values a partial file leaves empty are filled from the defaults when the
/// configuration is finalized.
///
/// # Example
///
/// ```no_run
/// use otterserve_config::ConfigLoader;
///
/// # fn main() -> Result<(), otterserve_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_file("config.yaml")?
///     .with_env_prefix("OTTERSERVE")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: OtterserveConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: OtterserveConfig::default(),
            env_prefix: None,
        }
    }

    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file contains invalid YAML
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse(&content)?;
        Ok(self)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file exists, loads it. If not, silently continues with the
    /// current layer.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use otterserve_config::ConfigLoader;
    ///
    /// let yaml = r#"
    /// server:
    ///   host: 127.0.0.1
    ///   port: 3000
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(yaml)
    ///     .unwrap()
    ///     .load_unvalidated()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.port, 3000);
    /// ```
    pub fn with_string(mut self, content: &str) -> Result<Self, ConfigError> {
        self.config = Self::parse(content)?;
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`.
    /// For example, with prefix "OTTERSERVE":
    /// - `OTTERSERVE__SERVER__PORT=8080`
    /// - `OTTERSERVE__LOGGING__LEVEL=debug`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Finalize, validate and return the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment override cannot be parsed
    /// or the final configuration is invalid.
    pub fn load(self) -> Result<OtterserveConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Finalize without validation.
    ///
    /// Environment overrides and defaults are still applied.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment override cannot be parsed.
    pub fn load_unvalidated(mut self) -> Result<OtterserveConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: Vec<(String, String)> = env::vars()
                .filter(|(k, _)| k.starts_with(&prefix))
                .collect();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        self.config.apply_defaults();
        Ok(self.config)
    }

    fn parse(content: &str) -> Result<OtterserveConfig, ConfigError> {
        // An empty document deserializes to unit, not to a mapping
        if content.trim().is_empty() {
            return Ok(OtterserveConfig {
                routes: Vec::new(),
                ..OtterserveConfig::default()
            });
        }
        Ok(serde_yaml::from_str(content)?)
    }

    // Apply a single environment variable
    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();

        match parts.as_slice() {
            ["SERVER", "HOST"] => {
                self.config.server.host = value.to_string();
            }
            ["SERVER", "PORT"] => {
                self.config.server.port = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected port 0-65535"))?;
            }
            ["AUTH", "ENABLED"] => {
                self.config.auth.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["AUTH", "USERNAME"] => {
                self.config.auth.username = value.to_string();
            }
            ["AUTH", "PASSWORD"] => {
                self.config.auth.password = value.to_string();
            }
            ["LOGGING", "LEVEL"] => {
                self.config.logging.level = value.to_lowercase();
            }
            ["LOGGING", "FILE"] => {
                self.config.logging.file = value.to_string();
            }

            // Unknown key - ignore
            _ => {}
        }

        Ok(())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, OtterserveConfig::default());
    }

    #[test]
    fn test_loader_with_string() {
        let yaml = r#"
server:
  host: 0.0.0.0
  port: 8080
auth:
  enabled: true
  username: admin
  password: secret
routes:
  - path: /static
    directory: ./
  - path: /docs
    directory: ./
logging:
  level: debug
  file: /var/log/otterserve.log
"#;

        let config = ConfigLoader::new()
            .with_string(yaml)
            .unwrap()
            .load_unvalidated()
            .unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(config.auth.enabled);
        assert_eq!(config.auth.username, "admin");
        assert_eq!(config.auth.password, "secret");
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[1].path, "/docs");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "/var/log/otterserve.log");
    }

    #[test]
    fn test_loader_partial_file_gets_defaults() {
        let yaml = "server:\n  port: 9000\n";
        let config = ConfigLoader::new()
            .with_string(yaml)
            .unwrap()
            .load_unvalidated()
            .unwrap();

        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.routes.len(), 1);
    }

    #[test]
    fn test_loader_missing_port_uses_default() {
        let yaml = "server:\n  host: example.org\n";
        let config = ConfigLoader::new()
            .with_string(yaml)
            .unwrap()
            .load_unvalidated()
            .unwrap();

        assert_eq!(config.server.port, 1123);
    }

    #[test]
    fn test_loader_empty_document() {
        let config = ConfigLoader::new()
            .with_string("")
            .unwrap()
            .load_unvalidated()
            .unwrap();
        assert_eq!(config, OtterserveConfig::default());
    }

    #[test]
    fn test_loader_invalid_yaml() {
        let result = ConfigLoader::new().with_string("server: [unclosed");
        assert!(matches!(result, Err(ConfigError::YamlError(_))));
    }

    #[test]
    fn test_loader_invalid_port() {
        let result = ConfigLoader::new().with_string("server:\n  port: 70000\n");
        assert!(matches!(result, Err(ConfigError::YamlError(_))));

        let result = ConfigLoader::new().with_string("server:\n  port: -1\n");
        assert!(matches!(result, Err(ConfigError::YamlError(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let dir = TempDir::new().unwrap();
        let result = ConfigLoader::new().with_file(dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let dir = TempDir::new().unwrap();
        let config = ConfigLoader::new()
            .with_optional_file(dir.path().join("missing.yaml"))
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, OtterserveConfig::default());
    }

    #[test]
    fn test_loader_with_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "server:\n  host: 127.0.0.1\n  port: 0\n").unwrap();

        let config = ConfigLoader::new().with_file(&path).unwrap().load().unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 0);
    }

    #[test]
    fn test_load_validates() {
        let result = ConfigLoader::new()
            .with_string("logging:\n  level: chatty\n")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));

        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));

        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_apply_env_var_server() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__SERVER__HOST", "10.0.0.1", "TEST").unwrap();
        loader.apply_env_var("TEST__SERVER__PORT", "8081", "TEST").unwrap();
        assert_eq!(loader.config.server.host, "10.0.0.1");
        assert_eq!(loader.config.server.port, 8081);
    }

    #[test]
    fn test_apply_env_var_auth() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__AUTH__ENABLED", "yes", "TEST").unwrap();
        loader.apply_env_var("TEST__AUTH__USERNAME", "admin", "TEST").unwrap();
        loader.apply_env_var("TEST__AUTH__PASSWORD", "s3:cret", "TEST").unwrap();
        assert!(loader.config.auth.enabled);
        assert_eq!(loader.config.auth.username, "admin");
        assert_eq!(loader.config.auth.password, "s3:cret");
    }

    #[test]
    fn test_apply_env_var_logging() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__LOGGING__LEVEL", "WARN", "TEST").unwrap();
        loader.apply_env_var("TEST__LOGGING__FILE", "out.log", "TEST").unwrap();
        assert_eq!(loader.config.logging.level, "warn");
        assert_eq!(loader.config.logging.file, "out.log");
    }

    #[test]
    fn test_apply_env_var_invalid_port() {
        let mut loader = ConfigLoader::new();
        let result = loader.apply_env_var("TEST__SERVER__PORT", "not-a-number", "TEST");
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
    }

    #[test]
    fn test_apply_env_var_invalid_bool() {
        let mut loader = ConfigLoader::new();
        let result = loader.apply_env_var("TEST__AUTH__ENABLED", "perhaps", "TEST");
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_env_var_unknown_key_ignored() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__SERVER__COLOR", "blue", "TEST").unwrap();
        assert_eq!(loader.config, OtterserveConfig::default());
    }
}
