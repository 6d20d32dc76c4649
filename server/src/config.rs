//! Server configuration module.
//!
//! Parses configuration from environment variables for the OmeroFS monitor
//! server. Engine settings (backend, default block size and timeout) are read
//! by [`omerofs_monitor::config::Config`] and nested here.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PORT` | No | 8080 | HTTP server port |
//! | `OMEROFS_BIND_ADDR` | No | 127.0.0.1 | Address to listen on |
//! | `OMEROFS_MAX_MONITORS` | No | 1024 | Maximum number of registered monitors |
//! | `OMEROFS_CALLBACK_TIMEOUT_SECS` | No | 10 | Timeout of each callback request |
//! | `OMEROFS_*` | No | - | Engine settings, see the monitor crate |

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use omerofs_monitor::config::{Config as EngineConfig, ConfigError as EngineConfigError};
use thiserror::Error;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default listen address. The control API has no authentication.
const DEFAULT_BIND_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Default maximum number of registered monitors.
const DEFAULT_MAX_MONITORS: usize = 1024;

/// Default timeout of a callback request (in seconds).
const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    /// Engine configuration is invalid.
    #[error("monitor engine configuration: {0}")]
    Engine(#[from] EngineConfigError),
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,

    /// Address to listen on.
    pub bind_addr: IpAddr,

    /// Maximum number of monitors registered at once.
    pub max_monitors: usize,

    /// Timeout of each callback request to a remote watcher.
    pub callback_timeout: Duration,

    /// Monitor engine configuration.
    pub monitor: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_addr: DEFAULT_BIND_ADDR,
            max_monitors: DEFAULT_MAX_MONITORS,
            callback_timeout: Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
            monitor: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `PORT` is not a valid u16
    /// - `OMEROFS_BIND_ADDR` is not an IP address
    /// - a count or timeout is not a positive integer
    /// - the engine configuration is invalid
    ///
    /// # Example
    ///
    /// ```no_run
    /// use omerofs_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on {}", config.socket_addr());
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_port()?;
        let bind_addr = parse_bind_addr()?;
        let max_monitors =
            parse_positive::<usize>("OMEROFS_MAX_MONITORS")?.unwrap_or(DEFAULT_MAX_MONITORS);
        let callback_timeout = Duration::from_secs(
            parse_positive("OMEROFS_CALLBACK_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_CALLBACK_TIMEOUT_SECS),
        );
        let monitor = EngineConfig::from_env()?;

        Ok(Self {
            port,
            bind_addr,
            max_monitors,
            callback_timeout,
            monitor,
        })
    }

    /// Returns the socket address to listen on.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.trim().parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse the OMEROFS_BIND_ADDR environment variable.
fn parse_bind_addr() -> Result<IpAddr, ConfigError> {
    match env::var("OMEROFS_BIND_ADDR") {
        Ok(addr) => addr.trim().parse().map_err(|_| ConfigError::InvalidFormat {
            var: "OMEROFS_BIND_ADDR".to_string(),
            message: format!("expected an IP address, got '{addr}'"),
        }),
        Err(_) => Ok(DEFAULT_BIND_ADDR),
    }
}

/// Parse an optional positive integer variable.
fn parse_positive<T>(var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr + PartialEq + Default,
{
    let Ok(value) = env::var(var) else {
        return Ok(None);
    };

    match value.trim().parse::<T>() {
        Ok(n) if n != T::default() => Ok(Some(n)),
        _ => Err(ConfigError::InvalidFormat {
            var: var.to_string(),
            message: format!("expected positive integer, got '{value}'"),
        }),
    }
}
