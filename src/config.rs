//! Configuration module for the telnet test server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Smallest listen backlog we accept
pub const MIN_BACKLOG: i32 = 5;

/// Command-line arguments for the test server
#[derive(Parser, Debug, Default)]
#[command(name = "telnet-test-server")]
#[command(author = "telnet-test-server authors")]
#[command(version = "0.1.0")]
#[command(about = "An interactive Telnet-style TCP test server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to (e.g., 0.0.0.0)
    #[arg(short = 'l', long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Push interval in milliseconds
    #[arg(short, long)]
    pub interval_ms: Option<u64>,

    /// Listen backlog (pending connections)
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Maximum number of concurrent sessions
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Title line shown in the welcome banner
    #[arg(long)]
    pub title: Option<String>,

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
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Maximum number of concurrent sessions
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// How long shutdown waits for sessions to close, in milliseconds
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            max_connections: default_max_connections(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// Per-session configuration
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Push interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Maximum bytes taken from the socket per read
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Title line shown in the welcome banner
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            read_buffer_size: default_read_buffer_size(),
            title: default_title(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2323
}

fn default_backlog() -> i32 {
    128
}

fn default_max_connections() -> usize {
    1024
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

fn default_interval_ms() -> u64 {
    1000 // 1 second
}

fn default_read_buffer_size() -> usize {
    1024
}

fn default_title() -> String {
    "SuperSSH Telnet TestServer".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Settings handed to every session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub interval: Duration,
    pub read_buffer_size: usize,
    pub title: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionConfig::default().into()
    }
}

impl From<SessionConfig> for SessionSettings {
    fn from(config: SessionConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            read_buffer_size: config.read_buffer_size,
            title: config.title,
        }
    }
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backlog: i32,
    pub max_connections: usize,
    pub shutdown_grace: Duration,
    pub session: SessionSettings,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config::merge(CliArgs::default(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let config = Config::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    /// Merge CLI args over TOML values (CLI takes precedence)
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let session = SessionConfig {
            interval_ms: cli.interval_ms.unwrap_or(toml_config.session.interval_ms),
            read_buffer_size: toml_config.session.read_buffer_size,
            title: cli.title.unwrap_or(toml_config.session.title),
        };

        Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            backlog: cli
                .backlog
                .unwrap_or(toml_config.server.backlog)
                .max(MIN_BACKLOG),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            shutdown_grace: Duration::from_millis(toml_config.server.shutdown_grace_ms),
            session: session.into(),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.interval.is_zero() {
            return Err(ConfigError::Invalid("interval_ms must be greater than 0"));
        }
        if self.session.read_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "read_buffer_size must be greater than 0",
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be greater than 0"));
        }
        Ok(())
    }

    /// Resolve host and port into a socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let listen = format!("{}:{}", self.host, self.port);
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ConfigError::Address(listen.clone(), e))?
            .next()
            .ok_or_else(|| {
                ConfigError::Address(
                    listen,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"),
                )
            })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Address(String, std::io::Error),
    Invalid(&'static str),
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
            ConfigError::Address(listen, e) => {
                write!(f, "Invalid listen address '{}': {}", listen, e)
            }
            ConfigError::Invalid(reason) => write!(f, "Invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 2323);
        assert_eq!(config.server.backlog, 128);
        assert_eq!(config.session.interval_ms, 1000);
        assert_eq!(config.session.read_buffer_size, 1024);
        assert_eq!(config.session.title, "SuperSSH Telnet TestServer");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 2424
            backlog = 16
            shutdown_grace_ms = 250

            [session]
            interval_ms = 500
            title = "Lab Box"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 2424);
        assert_eq!(config.server.backlog, 16);
        assert_eq!(config.server.max_connections, 1024);
        assert_eq!(config.server.shutdown_grace_ms, 250);
        assert_eq!(config.session.interval_ms, 500);
        assert_eq!(config.session.read_buffer_size, 1024);
        assert_eq!(config.session.title, "Lab Box");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 2424
            [session]
            interval_ms = 500
            [logging]
            level = "debug"
        "#,
        )
        .unwrap();

        let cli = CliArgs::parse_from([
            "telnet-test-server",
            "--port",
            "9000",
            "--interval-ms",
            "250",
        ]);

        let config = Config::merge(cli, toml_config);
        assert_eq!(config.port, 9000);
        assert_eq!(config.session.interval, Duration::from_millis(250));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_backlog_floor() {
        let cli = CliArgs::parse_from(["telnet-test-server", "--backlog", "1"]);
        let config = Config::merge(cli, TomlConfig::default());
        assert_eq!(config.backlog, MIN_BACKLOG);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let cli = CliArgs::parse_from(["telnet-test-server", "-i", "0"]);
        let config = Config::merge(cli, TomlConfig::default());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_listen_addr() {
        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        config.port = 2323;
        assert_eq!(
            config.listen_addr().unwrap(),
            "127.0.0.1:2323".parse::<SocketAddr>().unwrap()
        );
    }
}
