// Configuration management for the jump-host router
// Supports CLI arguments, config file (TOML), and environment variables

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

use crate::exec::{Job, Timeouts};
use crate::transport::SshOptions;

/// SSH jump-host router - pick a jump chain by target network and run commands through it
#[derive(Parser, Debug, Clone)]
#[command(name = "jump-router")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Route table file (`<cidr> via <chain>` lines, or JSON with a .json extension)
    #[arg(short, long, env = "JUMP_ROUTER_ROUTES")]
    pub routes: Option<PathBuf>,

    /// SSH private key path
    #[arg(short, long, env = "JUMP_ROUTER_KEY")]
    pub key: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(short, long, env = "JUMP_ROUTER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Path to configuration file
    #[arg(long, env = "JUMP_ROUTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// SSH connect timeout in seconds
    #[arg(long, env = "JUMP_ROUTER_CONNECT_TIMEOUT")]
    pub connect_timeout: Option<u64>,

    /// Timeout for the remote command or script in seconds
    #[arg(long, env = "JUMP_ROUTER_COMMAND_TIMEOUT")]
    pub command_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show which jump chain a target would use
    Resolve {
        /// Target host (user@host[:port])
        target: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List configured routes
    List {
        /// Test whether each route's first hop is reachable
        #[arg(short, long)]
        probe: bool,
    },

    /// Execute a command or script on a target through its jump chain
    Exec(ExecArgs),
}

#[derive(Args, Debug, Clone)]
#[command(group(clap::ArgGroup::new("job").required(true).args(["command", "script"])))]
pub struct ExecArgs {
    /// Target host (user@host[:port])
    pub target: String,

    /// Command to execute
    #[arg(short, long)]
    pub command: Option<String>,

    /// Script file to upload and execute
    #[arg(short, long)]
    pub script: Option<PathBuf>,

    /// Keep the uploaded script on the target
    #[arg(short = 'u', long)]
    pub keep_script: bool,

    /// Use this comma-separated jump chain (or `direct`) instead of the route table
    #[arg(short = 'j', long)]
    pub via: Option<String>,

    /// Print the execution report as JSON
    #[arg(long)]
    pub json: bool,
}

impl ExecArgs {
    /// The job to run; a command takes precedence over a script
    pub fn job(&self) -> Option<Job> {
        match (&self.command, &self.script) {
            (Some(cmd), _) => Some(Job::Command(cmd.clone())),
            (None, Some(path)) => Some(Job::Script {
                path: path.clone(),
                keep: self.keep_script,
            }),
            (None, None) => None,
        }
    }
}

/// Configuration file structure (TOML format)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// Route table settings
    #[serde(default)]
    pub routes: RoutesConfig,

    /// SSH client settings
    #[serde(default)]
    pub ssh: SshConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Route table file
    #[serde(default = "default_routes_file")]
    pub file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Private key passed with -i
    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// ConnectTimeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Timeout for connectivity checks in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,

    /// Timeout for the remote command or script in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,

    /// StrictHostKeyChecking value
    #[serde(default = "default_strict_host_key_checking")]
    pub strict_host_key_checking: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_routes_file() -> PathBuf {
    PathBuf::from("routes.conf")
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_probe_timeout() -> u64 {
    10
}
fn default_command_timeout() -> u64 {
    300
}
fn default_strict_host_key_checking() -> String {
    "accept-new".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for RoutesConfig {
    fn default() -> Self {
        RoutesConfig {
            file: default_routes_file(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            identity_file: None,
            connect_timeout_seconds: default_connect_timeout(),
            probe_timeout_seconds: default_probe_timeout(),
            command_timeout_seconds: default_command_timeout(),
            strict_host_key_checking: default_strict_host_key_checking(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

/// Merged configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub routes_file: PathBuf,
    pub log_level: Level,
    pub ssh: SshOptions,
    pub timeouts: Timeouts,
    /// File the settings were read from, if any
    pub config_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from all sources (CLI args, config file, defaults)
    /// Priority: CLI args > Environment variables > Config file > Defaults
    pub fn load(cli_args: &CliArgs) -> anyhow::Result<Self> {
        // Try loading from default locations
        let default_paths = [
            PathBuf::from("jump-router.toml"),
            PathBuf::from("config.toml"),
        ];
        let source = match &cli_args.config {
            Some(config_path) => Some(config_path.clone()),
            None => default_paths.into_iter().find(|path| path.exists()),
        };

        let config_file = match &source {
            Some(path) => read_config_file(path)?,
            None => ConfigFile::default(),
        };

        let mut config = Self::merge(cli_args, config_file)?;
        config.config_file = source;
        Ok(config)
    }

    /// CLI args override config file values
    pub fn merge(cli_args: &CliArgs, config_file: ConfigFile) -> anyhow::Result<Self> {
        let routes_file = cli_args
            .routes
            .clone()
            .unwrap_or(config_file.routes.file);

        let log_level = parse_log_level(
            cli_args
                .log_level
                .as_deref()
                .unwrap_or(config_file.logging.level.as_str()),
        )?;

        let ssh = SshOptions {
            identity_file: cli_args.key.clone().or(config_file.ssh.identity_file),
            connect_timeout_secs: cli_args
                .connect_timeout
                .unwrap_or(config_file.ssh.connect_timeout_seconds),
            strict_host_key_checking: config_file.ssh.strict_host_key_checking,
        };

        let timeouts = Timeouts {
            probe: Duration::from_secs(config_file.ssh.probe_timeout_seconds),
            command: Duration::from_secs(
                cli_args
                    .command_timeout
                    .unwrap_or(config_file.ssh.command_timeout_seconds),
            ),
        };

        Ok(Config {
            routes_file,
            log_level,
            ssh,
            timeouts,
            config_file: None,
        })
    }
}

fn read_config_file(path: &Path) -> anyhow::Result<ConfigFile> {
    let config_content = std::fs::read_to_string(path)?;
    Ok(toml::from_str::<ConfigFile>(&config_content)?)
}

fn parse_log_level(level_str: &str) -> anyhow::Result<Level> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(anyhow::anyhow!("Invalid log level: {}", level_str)),
    }
}
