//! Configuration management using Figment
//!
//! Layers, lowest priority first: built-in defaults, an optional TOML file,
//! then `ADAPTED_REPO_` environment variables (`__` separates sections, e.g.
//! `ADAPTED_REPO_REPOSITORY__ALLOW_IN_MEMORY_PROJECTION=true`).

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ADAPTED_REPO_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Repository facade behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Allow "materialize then project in memory" when the data source
    /// cannot push a projection down. Off by default: such calls fail with
    /// `ProjectionNotPushedDown` instead.
    #[serde(default)]
    pub allow_in_memory_projection: bool,

    /// Log rewritten expression text at debug level
    #[serde(default = "default_true")]
    pub log_rewrites: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            allow_in_memory_projection: false,
            log_rewrites: default_true(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `sqlite::memory:` or `postgres://...`
    pub url: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Defaults and environment only.
    pub fn load() -> AppResult<Self> {
        Self::extract(Self::defaults().merge(Self::env()))
    }

    /// Defaults, then `path` (if it exists), then environment.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::extract(
            Self::defaults()
                .merge(Toml::file(path.as_ref()))
                .merge(Self::env()),
        )
    }

    fn defaults() -> Figment {
        Figment::new().merge(Serialized::defaults(Config::default()))
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).split("__")
    }

    fn extract(figment: Figment) -> AppResult<Self> {
        figment.extract().map_err(|e| AppError::Configuration {
            message: e.to_string(),
        })
    }

    /// The default configuration rendered as TOML.
    pub fn default_toml() -> AppResult<String> {
        Self::default().to_toml()
    }

    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| AppError::Configuration {
            message: e.to_string(),
        })
    }
}
