//! Server configuration.
//!
//! Plain data, validated once before the server starts. Build it in code
//! through [`ServerBuilder`](crate::server::ServerBuilder) or load it from a
//! TOML file:
//!
//! ```toml
//! addr = ":1965"
//! cert_file = "/etc/mercury/cert.pem"
//! key_file = "/etc/mercury/key.pem"
//! server_name = "gem.example.com"
//! read_timeout_secs = 10
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Port registered for the Gemini protocol.
pub const DEFAULT_PORT: u16 = 1965;

/// Default bound on the TLS handshake and on the request read.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid listen address `{0}`")]
    Addr(String),
    #[error("cert_file and key_file must be set together")]
    PartialIdentity,
    #[error("no certificate configured")]
    MissingIdentity,
    #[error("loading certificate: {0}")]
    Identity(String),
    #[error("server_name must not be empty")]
    EmptyServerName,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// `host:port` to listen on. A leading `:` means every interface.
    pub addr: String,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    /// When set, requests for any other host are refused.
    pub server_name: Option<String>,
    /// Defaults to [`DEFAULT_READ_TIMEOUT_SECS`]. Zero disables the timeout.
    pub read_timeout_secs: u64,
    /// Zero disables the timeout.
    pub write_timeout_secs: u64,
    /// Logs every encoded response at debug level.
    pub debug: bool,
    /// Prints the banner to stderr on start.
    pub startup_message: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            cert_file: None,
            key_file: None,
            server_name: None,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            write_timeout_secs: 0,
            debug: false,
            startup_message: true,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_owned(), source })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.cert_file.is_some() != self.key_file.is_some() {
            return Err(ConfigError::PartialIdentity);
        }
        if self.server_name.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::EmptyServerName);
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        };
        addr.parse().map_err(|_| ConfigError::Addr(self.addr.clone()))
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.write_timeout_secs)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs != 0).then(|| Duration::from_secs(secs))
}
