use crate::classify::BlockingPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::Level;

/// Settings read from `critpath.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Read a TOML config file. Missing sections take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        contents
            .parse::<Config>()
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// The built-in defaults rendered as TOML, for `critpath config`.
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default()).context("Failed to serialize default config")
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.enabled && self.cache.capacity == 0 {
            anyhow::bail!("cache capacity must be greater than 0 when caching is enabled");
        }
        if Level::from_str(&self.logging.level).is_err() {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("Failed to parse config")
    }
}

/// How traces are turned into a critical path.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub blocking_policy: BlockingPolicy,
}

/// Memoization of computed paths per trace id.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_cache_capacity(),
        }
    }
}

/// `level` is any `tracing` level name; `RUST_LOG` overrides it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub include_modules: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            include_modules: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}
