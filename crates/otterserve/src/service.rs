//! System service registration.
//!
//! [`ServiceManager`] is the seam between the CLI and the host's service
//! manager. [`SystemdServiceManager`] writes a unit file and drives
//! `systemctl` through a [`CommandRunner`], so tests can substitute a
//! recorder for the real command.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use otterserve_config::ConfigManager;
use thiserror::Error;

/// Default directory for system unit files.
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// Seconds systemd waits before restarting a failed server.
pub const RESTART_DELAY_SECS: u64 = 5;

/// Errors raised while managing the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The unit file could not be written or removed.
    #[error("failed to update unit file {path}: {source}")]
    UnitFile {
        /// Unit file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A service-manager command could not be launched.
    #[error("failed to run {command}: {source}")]
    Spawn {
        /// The command line.
        command: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A service-manager command exited unsuccessfully.
    #[error("{command} failed: {stderr}")]
    CommandFailed {
        /// The command line.
        command: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The service is not installed.
    #[error("service {0} is not installed")]
    NotInstalled(String),
}

/// Reported service state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// The service is running.
    Running,
    /// The service is installed but not running.
    Stopped,
    /// No unit file exists.
    NotInstalled,
    /// The service manager reported something else.
    Unknown(String),
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::NotInstalled => write!(f, "not installed"),
            Self::Unknown(state) => write!(f, "unknown ({state})"),
        }
    }
}

/// Service management operations.
pub trait ServiceManager {
    /// Registers the service and enables it at boot.
    fn install(&self) -> Result<(), ServiceError>;

    /// Stops and removes the service.
    fn uninstall(&self) -> Result<(), ServiceError>;

    /// Starts the installed service.
    fn start(&self) -> Result<(), ServiceError>;

    /// Stops the running service.
    fn stop(&self) -> Result<(), ServiceError>;

    /// Queries the service state.
    fn status(&self) -> Result<ServiceStatus, ServiceError>;
}

/// Output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited with status zero.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Runs external commands.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and waits for it to exit.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ServiceError>;
}

/// [`CommandRunner`] backed by [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ServiceError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ServiceError::Spawn {
                command: command_line(program, args),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// What the service runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// Unit name without the `.service` suffix.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Absolute path of the executable.
    pub executable: PathBuf,
    /// Absolute path of the configuration file.
    pub config_path: PathBuf,
}

impl ServiceDefinition {
    /// Describes the running executable serving `config_path`.
    pub fn current(name: impl Into<String>, config_path: impl Into<PathBuf>) -> io::Result<Self> {
        Ok(Self {
            name: name.into(),
            description: "Otterserve HTTP file server".to_string(),
            executable: std::env::current_exe()?,
            config_path: config_path.into(),
        })
    }

    /// Returns the unit file name.
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.name)
    }

    /// The executable's directory, used as the service working directory.
    pub fn working_directory(&self) -> &Path {
        self.executable.parent().unwrap_or_else(|| Path::new("/"))
    }

    /// Renders the systemd unit.
    pub fn render_unit(&self) -> String {
        format!(
            "[Unit]\n\
             Description={description}\n\
             After=network.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             ExecStart={exe} --config {config}\n\
             WorkingDirectory={workdir}\n\
             Restart=on-failure\n\
             RestartSec={RESTART_DELAY_SECS}\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            description = self.description,
            exe = quote(&self.executable),
            config = quote(&self.config_path),
            workdir = self.working_directory().display(),
        )
    }
}

fn quote(path: &Path) -> String {
    let path = path.display().to_string();
    if path.contains(char::is_whitespace) {
        format!("\"{}\"", path.replace('"', "\\\""))
    } else {
        path
    }
}

/// [`ServiceManager`] for systemd hosts.
pub struct SystemdServiceManager<R = SystemCommandRunner> {
    definition: ServiceDefinition,
    unit_dir: PathBuf,
    runner: R,
}

impl<R> fmt::Debug for SystemdServiceManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemdServiceManager")
            .field("definition", &self.definition)
            .field("unit_dir", &self.unit_dir)
            .finish_non_exhaustive()
    }
}

impl SystemdServiceManager {
    /// Creates a manager writing to [`DEFAULT_UNIT_DIR`].
    pub fn new(definition: ServiceDefinition) -> Self {
        Self::with_runner(definition, DEFAULT_UNIT_DIR, SystemCommandRunner)
    }
}

impl<R: CommandRunner> SystemdServiceManager<R> {
    /// Creates a manager with an explicit unit directory and command runner.
    pub fn with_runner(
        definition: ServiceDefinition,
        unit_dir: impl Into<PathBuf>,
        runner: R,
    ) -> Self {
        Self {
            definition,
            unit_dir: unit_dir.into(),
            runner,
        }
    }

    /// Returns the unit file path.
    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(self.definition.unit_name())
    }

    /// Returns the service definition.
    pub fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    fn systemctl(&self, args: &[&str]) -> Result<CommandOutput, ServiceError> {
        let output = self.runner.run("systemctl", args)?;
        if output.success {
            Ok(output)
        } else {
            Err(ServiceError::CommandFailed {
                command: command_line("systemctl", args),
                stderr: output.stderr,
            })
        }
    }

    fn unit_file_error(&self, source: io::Error) -> ServiceError {
        ServiceError::UnitFile {
            path: self.unit_path(),
            source,
        }
    }
}

impl<R: CommandRunner> ServiceManager for SystemdServiceManager<R> {
    fn install(&self) -> Result<(), ServiceError> {
        let unit_path = self.unit_path();
        tracing::info!(
            unit = %unit_path.display(),
            executable = %self.definition.executable.display(),
            config = %self.definition.config_path.display(),
            "Installing service"
        );

        fs::create_dir_all(&self.unit_dir).map_err(|e| self.unit_file_error(e))?;
        fs::write(&unit_path, self.definition.render_unit())
            .map_err(|e| self.unit_file_error(e))?;

        let unit = self.definition.unit_name();
        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", &unit])?;

        tracing::info!(service = %self.definition.name, "Service installed");
        Ok(())
    }

    fn uninstall(&self) -> Result<(), ServiceError> {
        let unit_path = self.unit_path();
        if !unit_path.exists() {
            return Err(ServiceError::NotInstalled(self.definition.name.clone()));
        }

        tracing::info!(service = %self.definition.name, "Uninstalling service");

        if let Err(e) = self.stop() {
            tracing::debug!(error = %e, "Stop before uninstall failed");
        }

        let unit = self.definition.unit_name();
        self.systemctl(&["disable", &unit])?;
        fs::remove_file(&unit_path).map_err(|e| self.unit_file_error(e))?;
        self.systemctl(&["daemon-reload"])?;

        tracing::info!(service = %self.definition.name, "Service uninstalled");
        Ok(())
    }

    fn start(&self) -> Result<(), ServiceError> {
        self.systemctl(&["start", &self.definition.unit_name()])
            .map(|_| ())
    }

    fn stop(&self) -> Result<(), ServiceError> {
        self.systemctl(&["stop", &self.definition.unit_name()])
            .map(|_| ())
    }

    fn status(&self) -> Result<ServiceStatus, ServiceError> {
        if !self.unit_path().exists() {
            return Ok(ServiceStatus::NotInstalled);
        }

        // is-active exits non-zero for anything but "active"
        let output = self
            .runner
            .run("systemctl", &["is-active", &self.definition.unit_name()])?;

        Ok(match output.stdout.as_str() {
            "active" | "reloading" => ServiceStatus::Running,
            "inactive" | "failed" | "deactivating" => ServiceStatus::Stopped,
            other => ServiceStatus::Unknown(other.to_string()),
        })
    }
}

/// Validates the configuration file, writing defaults if it is missing,
/// then installs the service.
///
/// Nothing is registered when the configuration is invalid.
pub fn install_validated<S, C>(service: &S, configs: &C, config_path: &Path) -> anyhow::Result<()>
where
    S: ServiceManager,
    C: ConfigManager,
{
    let config = configs
        .load_or_create_default(config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;
    configs
        .validate(&config)
        .context("invalid configuration")?;

    service.install().context("failed to install service")
}

#[cfg(test)]
mod tests {
    use super::*;
    use otterserve_config::YamlConfigManager;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        failures: HashMap<String, String>,
        stdout: String,
    }

    impl RecordingRunner {
        fn failing(command: &str, stderr: &str) -> Self {
            Self {
                failures: HashMap::from([(command.to_string(), stderr.to_string())]),
                ..Self::default()
            }
        }

        fn with_stdout(stdout: &str) -> Self {
            Self {
                stdout: stdout.to_string(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ServiceError> {
            let line = command_line(program, args);
            self.calls.lock().push(line.clone());

            Ok(match self.failures.get(&line) {
                Some(stderr) => CommandOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: stderr.clone(),
                },
                None => CommandOutput {
                    success: true,
                    stdout: self.stdout.clone(),
                    stderr: String::new(),
                },
            })
        }
    }

    fn definition() -> ServiceDefinition {
        ServiceDefinition {
            name: "otterserve".to_string(),
            description: "Otterserve HTTP file server".to_string(),
            executable: PathBuf::from("/opt/otterserve/bin/otterserve"),
            config_path: PathBuf::from("/etc/otterserve/config.yaml"),
        }
    }

    fn manager(dir: &TempDir, runner: RecordingRunner) -> SystemdServiceManager<RecordingRunner> {
        SystemdServiceManager::with_runner(definition(), dir.path().join("units"), runner)
    }

    #[test]
    fn test_render_unit() {
        let unit = definition().render_unit();

        assert!(unit.contains(
            "ExecStart=/opt/otterserve/bin/otterserve --config /etc/otterserve/config.yaml\n"
        ));
        assert!(unit.contains("WorkingDirectory=/opt/otterserve/bin\n"));
        assert!(unit.contains("Restart=on-failure\n"));
        assert!(unit.contains("RestartSec=5\n"));
        assert!(unit.contains("WantedBy=multi-user.target"));
    }

    #[test]
    fn test_render_unit_quotes_paths_with_spaces() {
        let mut definition = definition();
        definition.config_path = PathBuf::from("/srv/my files/config.yaml");

        let unit = definition.render_unit();
        assert!(unit.contains("--config \"/srv/my files/config.yaml\""));
    }

    #[test]
    fn test_install_writes_unit_and_enables() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, RecordingRunner::default());

        manager.install().unwrap();

        let unit = fs::read_to_string(manager.unit_path()).unwrap();
        assert_eq!(unit, definition().render_unit());
        assert_eq!(
            manager.runner.calls(),
            vec![
                "systemctl daemon-reload",
                "systemctl enable otterserve.service"
            ]
        );
    }

    #[test]
    fn test_install_surfaces_command_failure() {
        let dir = TempDir::new().unwrap();
        let runner =
            RecordingRunner::failing("systemctl enable otterserve.service", "Access denied");
        let manager = manager(&dir, runner);

        let err = manager.install().unwrap_err();
        assert!(matches!(
            err,
            ServiceError::CommandFailed { ref stderr, .. } if stderr == "Access denied"
        ));
    }

    #[test]
    fn test_uninstall_ignores_stop_failure() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::failing("systemctl stop otterserve.service", "not loaded");
        let manager = manager(&dir, runner);
        manager.install().unwrap();

        manager.uninstall().unwrap();

        assert!(!manager.unit_path().exists());
        assert_eq!(
            &manager.runner.calls()[2..],
            [
                "systemctl stop otterserve.service",
                "systemctl disable otterserve.service",
                "systemctl daemon-reload",
            ]
        );
    }

    #[test]
    fn test_uninstall_when_not_installed() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, RecordingRunner::default());

        assert!(matches!(
            manager.uninstall(),
            Err(ServiceError::NotInstalled(_))
        ));
        assert!(manager.runner.calls().is_empty());
    }

    #[test]
    fn test_start_and_stop() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, RecordingRunner::default());

        manager.start().unwrap();
        manager.stop().unwrap();

        assert_eq!(
            manager.runner.calls(),
            vec![
                "systemctl start otterserve.service",
                "systemctl stop otterserve.service"
            ]
        );
    }

    #[test]
    fn test_status() {
        let dir = TempDir::new().unwrap();

        let manager = manager(&dir, RecordingRunner::with_stdout("active"));
        assert_eq!(manager.status().unwrap(), ServiceStatus::NotInstalled);

        manager.install().unwrap();
        assert_eq!(manager.status().unwrap(), ServiceStatus::Running);

        let manager = self::manager(&dir, RecordingRunner::with_stdout("failed"));
        assert_eq!(manager.status().unwrap(), ServiceStatus::Stopped);

        let manager = self::manager(&dir, RecordingRunner::with_stdout("activating"));
        assert_eq!(
            manager.status().unwrap(),
            ServiceStatus::Unknown("activating".to_string())
        );
    }

    #[test]
    fn test_install_validated_writes_default_config() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.yaml");
        let manager = manager(&dir, RecordingRunner::default());

        install_validated(&manager, &YamlConfigManager::new(), &config_path).unwrap();

        assert!(config_path.is_file());
        assert!(manager.unit_path().is_file());
    }

    #[test]
    fn test_install_validated_rejects_bad_config() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.yaml");
        fs::write(&config_path, "logging:\n  level: chatty\n").unwrap();
        let manager = manager(&dir, RecordingRunner::default());

        let err = install_validated(&manager, &YamlConfigManager::new(), &config_path)
            .unwrap_err();

        assert!(err.to_string().contains("invalid configuration"));
        assert!(!manager.unit_path().exists());
        assert!(manager.runner.calls().is_empty());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ServiceStatus::Running.to_string(), "running");
        assert_eq!(ServiceStatus::NotInstalled.to_string(), "not installed");
    }
}
