//! Foreground console runner.
//!
//! Loads the configuration, installs logging, then serves until the
//! process is asked to stop.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use otterserve_config::{ConfigManager, OtterserveConfig, YamlConfigManager};
use otterserve_server::{
    AuthPolicy, LifecycleManager, Route, Server, ServerConfig, ShutdownSignal,
};
use otterserve_telemetry::{init_logging, LogConfig};

/// Builds the server configuration from a loaded file.
pub fn server_config(config: &OtterserveConfig) -> ServerConfig {
    let auth = if config.auth.enabled {
        AuthPolicy::basic(&config.auth.username, &config.auth.password)
    } else {
        AuthPolicy::disabled()
    };

    let routes = config
        .routes
        .iter()
        .map(|r| Route::new(&r.path, &r.directory))
        .collect();

    ServerConfig::builder()
        .host(&config.server.host)
        .port(config.server.port)
        .routes(routes)
        .auth(auth)
        .build()
}

/// Builds the logging configuration from a loaded file.
pub fn log_config(config: &OtterserveConfig) -> LogConfig {
    LogConfig::default()
        .with_level(&config.logging.level)
        .with_file(config.logging.file_path())
}

/// Formats the startup banner printed to the console.
pub fn banner(addr: SocketAddr, config: &OtterserveConfig) -> String {
    let mut out = format!("Otterserve {} listening on http://{addr}\n", crate::VERSION);
    let auth = if config.auth.enabled { "enabled" } else { "disabled" };
    let _ = writeln!(out, "Authentication: {auth}");
    let _ = writeln!(out, "Routes:");
    for route in &config.routes {
        let _ = writeln!(out, "  {} -> {}", route.path, route.directory);
    }
    out.push_str("Press Ctrl+C to stop");
    out
}

/// Runs the server in the foreground.
#[derive(Debug, Clone)]
pub struct ConsoleRunner {
    config_path: PathBuf,
    manager: YamlConfigManager,
}

impl ConsoleRunner {
    /// Creates a runner for the given configuration file. Environment
    /// overrides apply on top of the file.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            manager: YamlConfigManager::with_env_overrides(),
        }
    }

    /// Replaces the configuration manager.
    #[must_use]
    pub fn with_manager(mut self, manager: YamlConfigManager) -> Self {
        self.manager = manager;
        self
    }

    /// Returns the configuration file path.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Loads the configuration, writing defaults if the file is missing,
    /// and validates it.
    pub fn prepare(&self) -> anyhow::Result<OtterserveConfig> {
        let config = self
            .manager
            .load_or_create_default(&self.config_path)
            .with_context(|| {
                format!("failed to load configuration from {}", self.config_path.display())
            })?;
        self.manager
            .validate(&config)
            .context("invalid configuration")?;
        Ok(config)
    }

    /// Loads configuration, installs logging and serves until SIGINT or
    /// SIGTERM.
    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.prepare()?;
        init_logging(&log_config(&config)).context("failed to initialize logging")?;

        tracing::info!(
            config = %self.config_path.display(),
            version = crate::VERSION,
            "Starting otterserve"
        );

        self.serve(config, ShutdownSignal::with_os_signals()).await
    }

    /// Serves `config` until `shutdown` fires.
    pub async fn serve(
        &self,
        config: OtterserveConfig,
        shutdown: ShutdownSignal,
    ) -> anyhow::Result<()> {
        let server = Server::new(server_config(&config));

        LifecycleManager::new(server)
            .on_started(move |addr| println!("{}", banner(addr, &config)))
            .run(shutdown)
            .await
            .context("server error")?;

        tracing::info!("Otterserve stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otterserve_config::RouteConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config_for(dir: &Path) -> OtterserveConfig {
        let mut config = OtterserveConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.routes = vec![RouteConfig::new("/static", dir.to_string_lossy())];
        config
    }

    #[test]
    fn test_server_config_conversion() {
        let mut config = OtterserveConfig::default();
        config.server.port = 8080;
        config.auth.enabled = true;
        config.auth.username = "admin".to_string();
        config.auth.password = "secret".to_string();
        config.routes.push(RouteConfig::new("/docs", "./docs"));

        let server = server_config(&config);
        assert_eq!(server.host(), "localhost");
        assert_eq!(server.port(), 8080);
        assert_eq!(server.routes().len(), 2);
        assert_eq!(server.routes()[1].mount_path, "/docs");
        assert_eq!(server.routes()[1].directory, PathBuf::from("./docs"));
        assert_eq!(server.auth(), &AuthPolicy::basic("admin", "secret"));
    }

    #[test]
    fn test_disabled_auth_drops_credentials() {
        let mut config = OtterserveConfig::default();
        config.auth.username = "admin".to_string();
        config.auth.password = "secret".to_string();

        assert_eq!(server_config(&config).auth(), &AuthPolicy::disabled());
    }

    #[test]
    fn test_log_config_conversion() {
        let mut config = OtterserveConfig::default();
        config.logging.level = "debug".to_string();
        assert_eq!(log_config(&config).level, "debug");
        assert!(log_config(&config).file.is_none());

        config.logging.file = "logs/otterserve.log".to_string();
        assert_eq!(
            log_config(&config).file,
            Some(PathBuf::from("logs/otterserve.log"))
        );
    }

    #[test]
    fn test_banner() {
        let mut config = OtterserveConfig::default();
        config.auth.enabled = true;
        let text = banner("127.0.0.1:1123".parse().unwrap(), &config);

        assert!(text.contains("http://127.0.0.1:1123"));
        assert!(text.contains("Authentication: enabled"));
        assert!(text.contains("  / -> ./"));
    }

    #[test]
    fn test_prepare_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let runner = ConsoleRunner::new(&path).with_manager(YamlConfigManager::new());

        let config = runner.prepare().unwrap();
        assert_eq!(config, OtterserveConfig::default());
        assert!(path.is_file());
    }

    #[test]
    fn test_prepare_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "auth:\n  enabled: true\n  username: admin\n  password: \"\"\n",
        )
        .unwrap();

        let runner = ConsoleRunner::new(&path).with_manager(YamlConfigManager::new());
        let err = runner.prepare().unwrap_err();
        assert!(err.to_string().contains("invalid configuration"));
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let runner = ConsoleRunner::new(dir.path().join("config.yaml"));
        let shutdown = ShutdownSignal::new();

        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            let config = config_for(dir.path());
            async move { runner.serve(config, shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.trigger();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_serve_reports_bind_failure() {
        let dir = TempDir::new().unwrap();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();

        let mut config = config_for(dir.path());
        config.server.port = taken.local_addr().unwrap().port();

        let runner = ConsoleRunner::new(dir.path().join("config.yaml"));
        let err = runner
            .serve(config, ShutdownSignal::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("server error"));
    }
}
