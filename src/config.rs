//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - query-registry.toml (default configuration)
//! - query-registry.local.toml (git-ignored local overrides)
//! - Environment variables (QUERY_REGISTRY_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # query-registry.toml
//! [registry]
//! default_ttl_secs = 1800
//! prune_interval_secs = 30
//! query_timeout_secs = 120.0
//! max_inline_rows = 500
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! QUERY_REGISTRY_REGISTRY__DEFAULT_TTL_SECS=60
//! QUERY_REGISTRY_LOGGING__LEVEL=trace
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Retention window for every query, counted from submission
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// How often the background pruner sweeps expired queries. 0 = no pruner.
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    /// Maximum number of tracked queries (0 = unlimited)
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    /// Executor timeout applied when a query does not set its own
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: f64,

    /// Largest `query_timeout` a caller may request
    #[serde(default = "default_max_query_timeout_secs")]
    pub max_query_timeout_secs: f64,

    /// Row buffer cap applied when a query does not set its own
    #[serde(default = "default_max_inline_rows")]
    pub max_inline_rows: usize,

    /// Largest `max_inline_rows` a caller may request
    #[serde(default = "default_max_inline_rows_limit")]
    pub max_inline_rows_limit: usize,

    /// Advisory re-poll hint handed back to callers
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_ttl_secs() -> u64 {
    3600
}
fn default_prune_interval_secs() -> u64 {
    60
}
fn default_max_queries() -> usize {
    1000
}
fn default_query_timeout_secs() -> f64 {
    300.0
}
fn default_max_query_timeout_secs() -> f64 {
    3600.0
}
fn default_max_inline_rows() -> usize {
    1000
}
fn default_max_inline_rows_limit() -> usize {
    100_000
}
fn default_poll_interval_secs() -> f64 {
    1.0
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl RegistryConfig {
    /// Retention window as a `Duration`
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Pruner period, `None` when background pruning is disabled
    pub fn prune_interval(&self) -> Option<Duration> {
        (self.prune_interval_secs > 0).then(|| Duration::from_secs(self.prune_interval_secs))
    }

    /// Check the settings for internal consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.default_ttl_secs == 0 {
            return Err("default_ttl_secs must be greater than 0".to_string());
        }
        // chrono cannot represent offsets beyond i64 milliseconds
        if i64::try_from(self.default_ttl_secs)
            .ok()
            .and_then(|secs| secs.checked_mul(1000))
            .is_none()
        {
            return Err(format!(
                "default_ttl_secs is too large: {}",
                self.default_ttl_secs
            ));
        }
        if !is_positive_secs(self.max_query_timeout_secs) {
            return Err(format!(
                "max_query_timeout_secs must be a positive number of seconds, got {}",
                self.max_query_timeout_secs
            ));
        }
        if !is_positive_secs(self.query_timeout_secs)
            || self.query_timeout_secs > self.max_query_timeout_secs
        {
            return Err(format!(
                "query_timeout_secs must be in (0, {}], got {}",
                self.max_query_timeout_secs, self.query_timeout_secs
            ));
        }
        if self.max_inline_rows_limit == 0 {
            return Err("max_inline_rows_limit must be greater than 0".to_string());
        }
        if self.max_inline_rows == 0 || self.max_inline_rows > self.max_inline_rows_limit {
            return Err(format!(
                "max_inline_rows must be in 1..={}, got {}",
                self.max_inline_rows_limit, self.max_inline_rows
            ));
        }
        if !is_positive_secs(self.poll_interval_secs) {
            return Err(format!(
                "poll_interval_secs must be a positive number of seconds, got {}",
                self.poll_interval_secs
            ));
        }
        Ok(())
    }
}

/// Representable as a `Duration` that is not zero after rounding to nanoseconds
pub(crate) fn is_positive_secs(secs: f64) -> bool {
    Duration::try_from_secs_f64(secs).is_ok_and(|d| !d.is_zero())
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. built-in defaults
    /// 2. query-registry.toml (base configuration)
    /// 3. query-registry.local.toml (local overrides, git-ignored)
    /// 4. Environment variables (QUERY_REGISTRY_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("query-registry.toml"))
            .merge(Toml::file("query-registry.local.toml"))
            .merge(Env::prefixed("QUERY_REGISTRY_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("QUERY_REGISTRY_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            registry: RegistryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            default_ttl_secs: default_ttl_secs(),
            prune_interval_secs: default_prune_interval_secs(),
            max_queries: default_max_queries(),
            query_timeout_secs: default_query_timeout_secs(),
            max_query_timeout_secs: default_max_query_timeout_secs(),
            max_inline_rows: default_max_inline_rows(),
            max_inline_rows_limit: default_max_inline_rows_limit(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
