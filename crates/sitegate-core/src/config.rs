//! TOML-based application configuration.
//!
//! Stores the tunables of the core pipeline:
//! - usage flush resolution
//! - badge batch policy, cache expiry, and cap
//! - retry policy
//! - the timeout view URL used on block
//!
//! Configuration is stored at `~/.config/sitegate/config.toml`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::batch::BatchPolicy;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::storage::data_dir;

/// Usage-tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Flush resolution of the recorder tick, in seconds.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
}

/// Badge pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeConfig {
    /// Debounce delay after the most recent update request (ms).
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Flush immediately once this many tabs are pending.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// Staleness ceiling since the last flush (ms).
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Badge cache entry lifetime (seconds).
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    /// Badge cache size ceiling before expired entries are pruned.
    #[serde(default = "default_cache_cap")]
    pub cache_cap: usize,
}

/// Retry configuration for retryable badge failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Blocking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingConfig {
    /// Where blocked tabs are navigated to.
    #[serde(default = "default_timeout_url")]
    pub timeout_url: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/sitegate/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub badge: BadgeConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub blocking: BlockingConfig,
}

fn default_tick_seconds() -> u64 {
    5
}
fn default_delay_ms() -> u64 {
    250
}
fn default_max_batch() -> usize {
    8
}
fn default_max_wait_ms() -> u64 {
    2000
}
fn default_cache_ttl_seconds() -> u64 {
    30
}
fn default_cache_cap() -> usize {
    256
}
fn default_max_attempts() -> u32 {
    4
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_timeout_url() -> String {
    "sitegate://timeout".to_string()
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
        }
    }
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_batch: default_max_batch(),
            max_wait_ms: default_max_wait_ms(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            cache_cap: default_cache_cap(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            timeout_url: default_timeout_url(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|err| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/sitegate"),
            message: err.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|err| ConfigError::ParseFailed(err.to_string()))
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|err| ConfigError::ParseFailed(err.to_string()))?;
        std::fs::write(&path, content).map_err(|err| ConfigError::SaveFailed {
            path,
            message: err.to_string(),
        })
    }

    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Batch policy derived from the badge section.
    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            delay: chrono::Duration::milliseconds(self.badge.delay_ms as i64),
            max_batch: self.badge.max_batch,
            max_wait: chrono::Duration::milliseconds(self.badge.max_wait_ms as i64),
        }
    }

    /// Retry policy derived from the retry section.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: std::time::Duration::from_millis(self.retry.base_delay_ms),
        }
    }
}
