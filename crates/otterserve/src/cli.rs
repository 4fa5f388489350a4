//! Command-line interface.

use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;

/// Serve local directories over HTTP.
///
/// Without an action flag the server runs in the foreground until it
/// receives Ctrl+C or SIGTERM.
#[derive(Debug, Clone, Parser)]
#[command(name = "otterserve", version, about)]
pub struct Cli {
    /// Install otterserve as a system service
    #[arg(long, conflicts_with = "uninstall")]
    pub install: bool,

    /// Remove the otterserve system service
    #[arg(long)]
    pub uninstall: bool,

    /// Path to the YAML configuration file
    #[arg(long, short = 'c', value_name = "PATH", default_value = "config.yaml")]
    pub config: PathBuf,
}

/// What the process was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Run the server in the foreground.
    Run,
    /// Register the system service.
    Install,
    /// Remove the system service.
    Uninstall,
}

impl Cli {
    /// Returns the requested action.
    pub fn action(&self) -> Action {
        if self.install {
            Action::Install
        } else if self.uninstall {
            Action::Uninstall
        } else {
            Action::Run
        }
    }

    /// Returns the configuration path made absolute against the working
    /// directory.
    ///
    /// A service starts in the executable's directory, so the path it is
    /// handed must not depend on where `--install` was run from.
    pub fn config_path(&self) -> io::Result<PathBuf> {
        absolute(&self.config)
    }
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
