use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read from the environment.
///
/// | Variable              | Default          |
/// |-----------------------|------------------|
/// | `FINDMY_SESSION_FILE` | required         |
/// | `DATABASE_URL`        | required         |
/// | `API_KEY`             | unset            |
/// | `TRACKING_INTERVAL`   | `300` (seconds)  |
/// | `DEVICE_SELECTOR`     | `iPhone 16 Pro`  |
/// | `HOST`                | `0.0.0.0`        |
/// | `PORT`                | `5000`           |
/// | `LOG_FORMAT`          | `pretty`         |
///
/// **Security**: `Debug` never prints the API key.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Session artifact produced by the external authentication flow.
    pub session_file: PathBuf,
    /// Datastore connection string, see [`StoreLocation::parse`].
    pub database_url: String,
    /// Pre-shared key for every gateway route except health.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_tracking_interval")]
    pub tracking_interval_secs: u64,
    #[serde(default = "default_device_selector")]
    pub device_selector: String,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("session_file", &self.session_file)
            .field("database_url", &self.database_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("tracking_interval_secs", &self.tracking_interval_secs)
            .field("device_selector", &self.device_selector)
            .field("daemon", &self.daemon)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let session_file = get("FINDMY_SESSION_FILE")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("FINDMY_SESSION_FILE"))?;
        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let tracking_interval_secs = match get("TRACKING_INTERVAL") {
            Some(raw) => parse_number("TRACKING_INTERVAL", &raw)?,
            None => default_tracking_interval(),
        };
        let port = match get("PORT") {
            Some(raw) => parse_number("PORT", &raw)?,
            None => default_daemon_port(),
        };
        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        let cfg = Config {
            session_file,
            database_url,
            api_key: get("API_KEY"),
            tracking_interval_secs,
            device_selector: get("DEVICE_SELECTOR").unwrap_or_else(default_device_selector),
            daemon: DaemonConfig {
                host: get("HOST").unwrap_or_else(default_daemon_host),
                port,
            },
            log_format,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Semantic validation for settings that are not expressible via types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracking_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "TRACKING_INTERVAL must be greater than zero".into(),
            ));
        }
        if self.device_selector.trim().is_empty() {
            return Err(ConfigError::Validation("DEVICE_SELECTOR cannot be empty".into()));
        }
        self.store_location()?;
        Ok(())
    }

    /// Polling cadence of the tracker loop.
    pub fn tracking_interval(&self) -> Duration {
        Duration::from_secs(self.tracking_interval_secs)
    }

    pub fn store_location(&self) -> Result<StoreLocation, ConfigError> {
        StoreLocation::parse(&self.database_url)
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.daemon.host, self.daemon.port)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw.to_string() })
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("unsupported datastore url: {0}")]
    UnsupportedStore(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_host")]
    pub host: String,
    #[serde(default = "default_daemon_port")]
    pub port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_daemon_host(),
            port: default_daemon_port(),
        }
    }
}

fn default_daemon_host() -> String {
    "0.0.0.0".into()
}
fn default_daemon_port() -> u16 {
    5000
}
fn default_tracking_interval() -> u64 {
    300
}
fn default_device_selector() -> String {
    "iPhone 16 Pro".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::Invalid {
                key: "LOG_FORMAT",
                value: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// StoreLocation
// ---------------------------------------------------------------------------

/// Where the observation store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

impl StoreLocation {
    /// Parse a datastore connection string.
    ///
    /// Accepts `sqlite://<path>`, `sqlite:<path>`, a bare filesystem path,
    /// and `sqlite::memory:` / `:memory:` for a transient database.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let url = url.trim();
        let rest = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        if rest == ":memory:" {
            return Ok(StoreLocation::Memory);
        }
        if rest.is_empty() || rest.contains("://") {
            return Err(ConfigError::UnsupportedStore(url.to_string()));
        }
        Ok(StoreLocation::File(PathBuf::from(rest)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
