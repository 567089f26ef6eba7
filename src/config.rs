//! Configuration module for frame-servers.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Protocol served by a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP-like text protocol framed by a blank line.
    Http,
    /// Tagged binary summing protocol.
    Sum,
}

/// Command-line arguments for the servers
#[derive(Parser, Debug)]
#[command(name = "frame-servers")]
#[command(author = "frame-servers authors")]
#[command(version = "0.1.0")]
#[command(about = "Minimal text and binary framing TCP servers", long_about = None)]
pub struct CliArgs {
    /// Port to listen on
    pub port: Option<u16>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Protocol to serve
    #[arg(short, long, value_enum)]
    pub protocol: Option<Protocol>,

    /// Address to bind to (e.g., 127.0.0.1)
    #[arg(long)]
    pub host: Option<String>,

    /// Seconds a read may block before the connection is abandoned
    #[arg(long = "read-timeout")]
    pub read_timeout_secs: Option<u64>,

    /// Largest request header block accepted by the http protocol, in bytes
    #[arg(long)]
    pub max_request_size: Option<usize>,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    pub port: Option<u16>,
    /// Protocol to serve
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    /// Read timeout in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            protocol: default_protocol(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

/// Text protocol configuration
#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    /// Capacity of the request buffer in bytes
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_request_size: default_max_request_size(),
        }
    }
}

/// Identity reported to clients by both protocols
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Display name, first line of a GET response body
    #[serde(default = "default_identity_name")]
    pub name: String,
    /// Identifier, second GET body line and the binary greeting
    #[serde(default = "default_identity_id")]
    pub id: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: default_identity_name(),
            id: default_identity_id(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_protocol() -> Protocol {
    Protocol::Http
}

fn default_read_timeout() -> u64 {
    10
}

fn default_max_request_size() -> usize {
    1_024_000
}

fn default_identity_name() -> String {
    "Caroline Danzi".to_string()
}

fn default_identity_id() -> String {
    "danzicr".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("server.log")
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub read_timeout: Duration,
    pub max_request_size: usize,
    pub identity: IdentityConfig,
    pub log_level: String,
    pub log_file: PathBuf,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let port = cli
            .port
            .or(toml_config.server.port)
            .ok_or(ConfigError::MissingPort)?;

        Ok(Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port,
            protocol: cli.protocol.unwrap_or(toml_config.server.protocol),
            read_timeout: Duration::from_secs(
                cli.read_timeout_secs
                    .unwrap_or(toml_config.server.read_timeout_secs),
            ),
            max_request_size: cli
                .max_request_size
                .unwrap_or(toml_config.http.max_request_size),
            identity: toml_config.identity,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
            log_file: cli.log_file.unwrap_or(toml_config.logging.file),
        })
    }

    /// Address string the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    MissingPort,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::MissingPort => {
                write!(f, "Invalid usage - first arg must be port which is an integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
