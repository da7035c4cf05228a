//! CLI argument definitions for docklens-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Config path used when `--config` is not given.
///
/// A missing file at this path falls back to built-in defaults.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/docklens/docklens.toml";

/// Docklens image vulnerability scan daemon.
///
/// Serves the scan HTTP API, runs the external scanner under an
/// admission cap and persists scan records.
#[derive(Parser, Debug)]
#[command(name = "docklens-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to docklens.toml configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override HTTP listen port.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Whether `--config` still points at the built-in default path.
    pub fn uses_default_config(&self) -> bool {
        self.config.as_os_str() == DEFAULT_CONFIG_PATH
    }

    /// Apply CLI overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut docklens_core::config::DocklensConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file = pid_file.clone();
        }
    }
}
