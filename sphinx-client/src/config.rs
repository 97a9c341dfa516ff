//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via SPHINX_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use sphinx_protocol::DEFAULT_PORT;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix that marks a host as a Unix socket path.
const UNIX_SCHEME: &str = "unix://";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host name, IP address, or Unix socket path (`/path` or `unix:///path`).
    pub host: String,
    /// TCP port; ignored for Unix sockets.
    pub port: u16,
    /// Connect and handshake timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Time to wait for a complete reply in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 30_000,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Loads configuration from `path` (if given), then applies environment overrides.
    pub fn load_from(path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: ClientConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `SPHINX_HOST`, `SPHINX_PORT` and `SPHINX_TIMEOUT_MS` from `lookup`.
    /// Unparseable values are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("SPHINX_HOST") {
            if !host.is_empty() {
                self.host = host;
            }
        }

        if let Some(port) = lookup("SPHINX_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }

        if let Some(timeout) = lookup("SPHINX_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.connect_timeout_ms = ms;
                self.read_timeout_ms = ms;
            }
        }
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(())
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets both the connect and the read timeout.
    pub fn with_timeout(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self.read_timeout_ms = ms;
        self
    }

    pub fn with_connect_timeout(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn with_read_timeout(mut self, ms: u64) -> Self {
        self.read_timeout_ms = ms;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Checks the settings and resolves where to connect.
    pub fn address(&self) -> Result<ServerAddress, ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Validation("host must not be empty".into()));
        }
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(ConfigError::Validation("timeouts must be positive".into()));
        }

        if let Some(path) = self.host.strip_prefix(UNIX_SCHEME) {
            if path.is_empty() {
                return Err(ConfigError::Validation("unix socket path is empty".into()));
            }
            return Ok(ServerAddress::Unix(PathBuf::from(path)));
        }
        if self.host.starts_with('/') {
            return Ok(ServerAddress::Unix(PathBuf::from(&self.host)));
        }

        if self.port == 0 {
            return Err(ConfigError::Validation("port must be positive".into()));
        }
        Ok(ServerAddress::Tcp {
            host: self.host.clone(),
            port: self.port,
        })
    }
}

/// Resolved searchd endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerAddress::Tcp { host, port } => write!(f, "{}:{}", host, port),
            ServerAddress::Unix(path) => write!(f, "{}{}", UNIX_SCHEME, path.display()),
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {1}", path = .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config file '{path}': {1}", path = .0.display())]
    Parse(PathBuf, String),

    #[error("{0}")]
    Validation(String),
}
