//! Configuration loading for the Gluon journal client.
//!
//! All fields are required unless explicitly marked optional.

use gluon_cache::CacheConfig;
use gluon_core::Cluster;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "GLUON_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub cluster: Cluster,
    /// Buffered outcomes per subscriber before slow subscribers lag.
    pub outcome_capacity: usize,
    pub cache: CacheSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub refetch_on_invalidate: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or GLUON_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("Failed to initialize tracing: {0}")]
    Telemetry(String),
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Defaults for a local validator.
    pub fn localnet() -> Self {
        Self {
            cluster: Cluster::localnet(),
            outcome_capacity: 64,
            cache: CacheSettings {
                refetch_on_invalidate: true,
            },
            logging: LoggingConfig {
                filter: crate::telemetry::DEFAULT_FILTER.to_string(),
                format: LogFormat::Plain,
            },
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new().with_refetch_on_invalidate(self.cache.refetch_on_invalidate)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cluster.name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.cluster.endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cluster.endpoint",
                reason: "must not be empty".to_string(),
            });
        }
        if !(self.cluster.endpoint.starts_with("http://")
            || self.cluster.endpoint.starts_with("https://"))
        {
            return Err(ConfigError::InvalidValue {
                field: "cluster.endpoint",
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if self.outcome_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "outcome_capacity",
                reason: "must be > 0".to_string(),
            });
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
