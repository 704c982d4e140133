//! Runtime configuration.
//!
//! # Responsibility
//! - Resolve settings from the environment with documented defaults.
//! - Validate the merged result before any listener starts.
//!
//! # Invariants
//! - Ports are non-zero.
//! - `pyspider_url` starts with `http://` or `https://` and has no trailing `/`.

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_PORT: &str = "PORT";
pub const ENV_DEBUG_TOOLS_PORT: &str = "DEBUG_TOOLS_PORT";
pub const ENV_HOST: &str = "NXWEB_HOST";
pub const ENV_DB_PATH: &str = "NXWEB_DB_PATH";
pub const ENV_PYSPIDER_URL: &str = "PYSPIDER_API_URL";
pub const ENV_PYTHON: &str = "NXWEB_PYTHON";
pub const ENV_LOG_LEVEL: &str = "NXWEB_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "NXWEB_LOG_DIR";

pub const DEFAULT_PORT: u16 = 3002;
pub const DEFAULT_DEBUG_TOOLS_PORT: u16 = 3001;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PYSPIDER_URL: &str = "http://localhost:5000";
pub const DEFAULT_PYTHON: &str = "python";
pub const DEFAULT_DB_FILE: &str = "nxweb.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidPort { key: &'static str, value: String },
    InvalidUrl(String),
    Empty(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPort { key, value } => {
                write!(f, "{key} must be a port number between 1 and 65535, got `{value}`")
            }
            Self::InvalidUrl(value) => write!(
                f,
                "{ENV_PYSPIDER_URL} must start with http:// or https://, got `{value}`"
            ),
            Self::Empty(key) => write!(f, "{key} cannot be empty"),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub debug_tools_port: u16,
    pub db_path: PathBuf,
    pub pyspider_url: String,
    pub python: String,
    pub log_level: String,
    pub log_dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            debug_tools_port: DEFAULT_DEBUG_TOOLS_PORT,
            db_path: std::env::temp_dir().join(DEFAULT_DB_FILE),
            pyspider_url: DEFAULT_PYSPIDER_URL.to_string(),
            python: DEFAULT_PYTHON.to_string(),
            log_level: crate::logging::default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Builds a validated config from a variable map; missing or blank keys
    /// fall back to defaults.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            vars.get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(host) = get(ENV_HOST) {
            config.host = host.to_string();
        }
        if let Some(port) = get(ENV_PORT) {
            config.port = parse_port(ENV_PORT, port)?;
        }
        if let Some(port) = get(ENV_DEBUG_TOOLS_PORT) {
            config.debug_tools_port = parse_port(ENV_DEBUG_TOOLS_PORT, port)?;
        }
        if let Some(path) = get(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(url) = get(ENV_PYSPIDER_URL) {
            config.pyspider_url = url.to_string();
        }
        if let Some(python) = get(ENV_PYTHON) {
            config.python = python.to_string();
        }
        if let Some(level) = get(ENV_LOG_LEVEL) {
            config.log_level = level.to_string();
        }
        config.log_dir = get(ENV_LOG_DIR).map(str::to_string);

        config.validate()
    }

    /// Checks invariants and normalizes the crawler URL.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort {
                key: ENV_PORT,
                value: "0".into(),
            });
        }
        if self.debug_tools_port == 0 {
            return Err(ConfigError::InvalidPort {
                key: ENV_DEBUG_TOOLS_PORT,
                value: "0".into(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Empty(ENV_HOST));
        }
        if self.python.trim().is_empty() {
            return Err(ConfigError::Empty(ENV_PYTHON));
        }
        self.pyspider_url = normalize_url(&self.pyspider_url)?;
        Ok(self)
    }

    pub fn dashboard_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn debug_tools_addr(&self) -> String {
        format!("{}:{}", self.host, self.debug_tools_port)
    }
}

fn parse_port(key: &'static str, value: &str) -> Result<u16, ConfigError> {
    match value.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort {
            key,
            value: value.to_string(),
        }),
    }
}

fn normalize_url(url: &str) -> Result<String, ConfigError> {
    let trimmed = url.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidUrl(trimmed.to_string()));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}
