//! Server configuration loaded from `CHATLINE_*` environment variables.
//!
//! # Environment Variables
//!
//! - `CHATLINE_PORT`: HTTP port. Default: `3000`
//! - `CHATLINE_SOCKET_PORT`: separate WebSocket port (optional). The
//!   `/socket` endpoint is always served on the HTTP port as well.
//! - `CHATLINE_CLIENT_URL`: origin allowed by CORS (optional)
//! - `CHATLINE_ENV`: `development` or `production`. Default: `production`
//! - `CHATLINE_OUTBOUND_BUFFER`: per-connection outbound queue size. Default: `256`
//! - `CHATLINE_DRAIN_TIMEOUT_SECS`: shutdown drain window. Default: `10`
//! - `CHATLINE_LOG_FORMAT`: `pretty` or `json`. Default: `pretty`

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Deployment environment.
///
/// Controls how much error detail the HTTP surface reveals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Detailed error messages in responses
    Development,
    /// Generic error messages for 400/500 responses
    #[default]
    Production,
}

impl Environment {
    /// Parse an environment name.
    ///
    /// Valid values (case-insensitive):
    /// - "development", "dev", "local" -> Development
    /// - anything else -> Production
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "development" | "dev" | "local" => Environment::Development,
            _ => Environment::Production,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Console log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port (health, presence and `/socket`)
    pub port: u16,
    /// Optional dedicated WebSocket port
    pub socket_port: Option<u16>,
    /// Origin allowed by CORS; permissive when unset
    pub client_url: Option<String>,
    pub environment: Environment,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    /// How long shutdown waits for open sockets to close
    pub drain_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            socket_port: None,
            client_url: None,
            environment: Environment::default(),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Load server configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load server configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = parse_var(&lookup, "CHATLINE_PORT")?.unwrap_or(defaults.port);
        let socket_port = parse_var(&lookup, "CHATLINE_SOCKET_PORT")?;
        let client_url = lookup("CHATLINE_CLIENT_URL").filter(|url| !url.trim().is_empty());
        let environment = lookup("CHATLINE_ENV")
            .map(|s| Environment::parse(&s))
            .unwrap_or_default();

        let outbound_buffer: usize = parse_var(&lookup, "CHATLINE_OUTBOUND_BUFFER")?
            .unwrap_or(defaults.outbound_buffer);
        if outbound_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHATLINE_OUTBOUND_BUFFER",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let drain_timeout = parse_var::<u64, _>(&lookup, "CHATLINE_DRAIN_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.drain_timeout);

        let log_format = lookup("CHATLINE_LOG_FORMAT")
            .map(|s| LogFormat::parse(&s))
            .unwrap_or_default();

        Ok(Self {
            port,
            socket_port,
            client_url,
            environment,
            outbound_buffer,
            drain_timeout,
            log_format,
        })
    }

    /// The dedicated socket port, if it differs from the HTTP port.
    pub fn separate_socket_port(&self) -> Option<u16> {
        self.socket_port.filter(|port| *port != self.port)
    }

    /// Log the current server configuration.
    pub fn log_config(&self) {
        info!("Environment: {}", self.environment);
        info!("HTTP port: {}", self.port);
        match self.separate_socket_port() {
            Some(port) => info!("WebSocket port: {} (also on HTTP port)", port),
            None => info!("WebSocket: served on HTTP port"),
        }
        match &self.client_url {
            Some(url) => info!("CORS origin: {}", url),
            None => info!("CORS: permissive (no client URL configured)"),
        }
        info!(
            outbound_buffer = self.outbound_buffer,
            drain_timeout_secs = self.drain_timeout.as_secs(),
            "Connection settings"
        );
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}
