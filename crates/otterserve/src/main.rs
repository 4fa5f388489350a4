//! Otterserve - Entry point

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use otterserve::service::install_validated;
use otterserve::{
    Action, Cli, ConsoleRunner, ServiceDefinition, ServiceManager, SystemdServiceManager,
    SERVICE_NAME,
};
use otterserve_config::YamlConfigManager;
use otterserve_telemetry::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.config_path().context("failed to resolve configuration path") {
        Ok(config_path) => match cli.action() {
            Action::Run => ConsoleRunner::new(config_path).run().await,
            Action::Install => install(&config_path),
            Action::Uninstall => uninstall(&config_path),
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Otterserve failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn service_manager(config_path: &Path) -> anyhow::Result<SystemdServiceManager> {
    let definition = ServiceDefinition::current(SERVICE_NAME, config_path)
        .context("failed to locate the otterserve executable")?;
    Ok(SystemdServiceManager::new(definition))
}

fn install(config_path: &Path) -> anyhow::Result<()> {
    init_logging(&LogConfig::default())?;
    let manager = service_manager(config_path)?;
    install_validated(&manager, &YamlConfigManager::with_env_overrides(), config_path)?;
    println!("Service {SERVICE_NAME} installed");
    Ok(())
}

fn uninstall(config_path: &Path) -> anyhow::Result<()> {
    init_logging(&LogConfig::default())?;
    service_manager(config_path)?
        .uninstall()
        .context("failed to uninstall service")?;
    println!("Service {SERVICE_NAME} uninstalled");
    Ok(())
}
