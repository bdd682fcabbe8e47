// ABOUTME: Backend configuration for the hosted auth and table service
// ABOUTME: Loads a TOML file, overlays environment variables, and validates the result

pub mod constants;

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use constants::*;

pub const DEFAULT_TASKS_TABLE: &str = taskmaster_core::TASKS_TABLE;
pub const DEFAULT_OAUTH_CALLBACK_PORT: u16 = 3737;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config format: {0}")]
    Format(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Project URL must use HTTPS: {0}")]
    InsecureUrl(String),
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u16),
    #[error("Request timeout must be between 1 and {max} seconds, got {0}", max = MAX_REQUEST_TIMEOUT_SECS)]
    TimeoutOutOfRange(u64),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Connection settings for the hosted backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project URL, e.g. https://xyzcompany.supabase.co
    pub project_url: String,

    /// Public anonymous key sent as the `apikey` header
    pub anon_key: String,

    /// Table holding task rows
    pub tasks_table: String,

    /// Where the restored session is kept between runs; `None` keeps it in memory only
    pub session_file: Option<PathBuf>,

    /// Local port receiving OAuth redirects
    pub oauth_callback_port: u16,

    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            project_url: String::new(),
            anon_key: String::new(),
            tasks_table: DEFAULT_TASKS_TABLE.to_string(),
            session_file: None,
            oauth_callback_port: DEFAULT_OAUTH_CALLBACK_PORT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    pub fn with_credentials(project_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            project_url: project_url.into(),
            anon_key: anon_key.into(),
            ..Self::default()
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = env::var(TASKMASTER_CONFIG) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taskmaster")
            .join("config.toml")
    }

    /// Load file configuration, overlay the process environment, and validate
    pub fn load() -> ConfigResult<Self> {
        let mut config = Self::from_file(&Self::config_path())?;
        config.apply_lookup(|key| env::var(key).ok())?;
        if config.session_file.is_none() {
            config.session_file = Some(taskmaster_core::session_file());
        }
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Build a configuration purely from a key lookup (environment in production)
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_lookup(lookup)?;
        Ok(config)
    }

    /// Overlay any values present in the lookup
    pub fn apply_lookup<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = lookup(TASKMASTER_SUPABASE_URL) {
            self.project_url = url;
        }
        if let Some(key) = lookup(TASKMASTER_SUPABASE_ANON_KEY) {
            self.anon_key = key;
        }
        if let Some(table) = lookup(TASKMASTER_TASKS_TABLE) {
            self.tasks_table = table;
        }
        if let Some(path) = lookup(TASKMASTER_SESSION_FILE) {
            self.session_file = Some(PathBuf::from(path));
        }
        if let Some(port) = lookup(TASKMASTER_OAUTH_CALLBACK_PORT) {
            self.oauth_callback_port = parse_value(TASKMASTER_OAUTH_CALLBACK_PORT, &port)?;
        }
        if let Some(timeout) = lookup(TASKMASTER_HTTP_TIMEOUT_SECS) {
            self.request_timeout_secs = parse_value(TASKMASTER_HTTP_TIMEOUT_SECS, &timeout)?;
        }
        Ok(())
    }

    /// Save configuration to disk
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.project_url.is_empty() {
            return Err(ConfigError::Missing("Project URL"));
        }
        if self.anon_key.is_empty() {
            return Err(ConfigError::Missing("Anonymous key"));
        }
        if self.tasks_table.is_empty() {
            return Err(ConfigError::Missing("Tasks table"));
        }
        if !self.project_url.starts_with("https://") && !is_local_url(&self.project_url) {
            return Err(ConfigError::InsecureUrl(self.project_url.clone()));
        }
        if self.oauth_callback_port == 0 {
            return Err(ConfigError::PortOutOfRange(self.oauth_callback_port));
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.request_timeout_secs) {
            return Err(ConfigError::TimeoutOutOfRange(self.request_timeout_secs));
        }
        Ok(())
    }

    /// Project URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.project_url.trim_end_matches('/')
    }
}

// Plain HTTP is only accepted for backends running on this machine.
fn is_local_url(url: &str) -> bool {
    ["http://localhost", "http://127.0.0.1"]
        .iter()
        .any(|prefix| {
            url.strip_prefix(prefix)
                .map(|rest| rest.is_empty() || rest.starts_with(':') || rest.starts_with('/'))
                .unwrap_or(false)
        })
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
