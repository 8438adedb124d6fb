use std::{env, fs, path::PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Failures while resolving the client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// SSE transport tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SseConfig {
    /// Delay before redialing a dropped stream, in milliseconds.
    pub reconnect_backoff_ms: u64,
    /// Request timeout for the initial stream connect, in seconds.
    pub connect_timeout_seconds: u64,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_ms: 1_000,
            connect_timeout_seconds: 10,
        }
    }
}

/// Cache sizing knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Messages requested per pagination fetch.
    pub page_size: u32,
    /// Resident pages kept per stream; older interior pages are pruned.
    pub max_resident_pages: usize,
    /// Maximum event ids remembered by the dedup window.
    pub dedup_capacity: usize,
    /// Dedup window for `new_message` events, in seconds.
    pub dedup_create_ttl_seconds: u64,
    /// Dedup window for update/delete events, in seconds.
    pub dedup_patch_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_resident_pages: 16,
            dedup_capacity: 64,
            dedup_create_ttl_seconds: 30,
            dedup_patch_ttl_seconds: 5,
        }
    }
}

/// The main configuration for the RustyChat client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the chat server.
    pub api_base: Url,

    /// Logging filter, `tracing_subscriber::EnvFilter` syntax.
    pub log_level: String,

    pub sse: SseConfig,

    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: Url::parse("http://localhost:8080").expect("static default URL"),
            log_level: "info".to_string(),
            sse: SseConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Default location of the config file (`<config dir>/rustychat/config.toml`).
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.config_dir().join("rustychat").join("config.toml"))
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// # Arguments
    /// * `config_path` - Optional explicit path; otherwise [`Self::default_path`]
    ///   is consulted and silently skipped when absent.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when an explicit file is unreadable or
    /// unparseable, or when the resolved values fail validation.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    tracing::debug!("no config file found; using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(api_base) = env::var("RUSTYCHAT_API_BASE") {
            self.api_base = Url::parse(&api_base).map_err(|err| {
                ConfigError::Invalid(format!("RUSTYCHAT_API_BASE is not a valid URL: {err}"))
            })?;
        }
        if let Ok(log_level) = env::var("RUSTYCHAT_LOG_LEVEL") {
            self.log_level = log_level;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.page_size == 0 {
            return Err(ConfigError::Invalid("cache.page_size must be > 0".into()));
        }
        if self.cache.max_resident_pages == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_resident_pages must be > 0".into(),
            ));
        }
        if self.cache.dedup_capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache.dedup_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}
