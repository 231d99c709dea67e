//! Configuration management for authflow.
//!
//! Loads configuration from ${AUTHFLOW_HOME}/config.toml with sensible defaults.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Env var overriding `api.base_url`.
pub const BASE_URL_ENV: &str = "AUTHFLOW_BASE_URL";
/// Env var overriding `log_level`.
pub const LOG_ENV: &str = "AUTHFLOW_LOG";

fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for authflow configuration and data.
    //!
    //! `AUTHFLOW_HOME` resolution order:
    //! 1. `AUTHFLOW_HOME` environment variable (if set)
    //! 2. ~/.config/authflow (default)
    //! 3. ./.authflow when no home directory can be determined

    use std::path::PathBuf;

    /// Returns the authflow home directory.
    pub fn authflow_home() -> PathBuf {
        if let Ok(home) = std::env::var("AUTHFLOW_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".authflow"),
            |h| h.join(".config").join("authflow"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        authflow_home().join("config.toml")
    }
}

/// Remote API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL; endpoints are appended as paths (e.g. `/users/token`).
    pub base_url: String,

    /// Request timeout in seconds (0 disables)
    pub timeout_secs: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Config::DEFAULT_BASE_URL.to_string(),
            timeout_secs: Config::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default tracing filter
    pub log_level: String,

    /// API endpoint settings
    pub api: ApiConfig,
}

/// Values taken from the environment that win over the config file.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub base_url: Option<String>,
    pub log_level: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            base_url: non_empty(BASE_URL_ENV),
            log_level: non_empty(LOG_ENV),
        }
    }
}

impl Config {
    const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";
    const DEFAULT_TIMEOUT_SECS: u32 = 30;
    const DEFAULT_LOG_LEVEL: &str = "warn";

    /// Loads configuration from the default config path, then applies env overrides.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed,
    /// or if the resulting base URL is invalid.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&paths::config_path())?;
        config.apply_overrides(EnvOverrides::from_env());
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    pub fn apply_overrides(&mut self, overrides: EnvOverrides) {
        if let Some(base_url) = overrides.base_url {
            self.api.base_url = base_url;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
    }

    /// Checks that the base URL is an absolute http(s) URL.
    ///
    /// # Errors
    /// Returns an error describing the offending value.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid api.base_url '{}'", self.api.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "Invalid api.base_url '{}': expected an http or https URL",
                self.api.base_url
            );
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api.base_url.trim_end_matches('/')
    }

    /// Returns the request timeout, or None if disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.api.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(u64::from(secs))),
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    ///
    /// # Errors
    /// Returns an error if the file exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;

        // Staged next to the target so the final link is a same-filesystem move.
        let mut staged = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to stage config in {}", dir.display()))?;
        staged
            .write_all(default_config_template().as_bytes())
            .context("Failed to write config template")?;
        staged.persist_noclobber(path).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                anyhow::anyhow!("Config file already exists at {}", path.display())
            } else {
                anyhow::Error::new(e.error)
                    .context(format!("Failed to create config at {}", path.display()))
            }
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Self::DEFAULT_LOG_LEVEL.to_string(),
            api: ApiConfig::default(),
        }
    }
}
