//! Board configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{CacheConfig, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for a board session. Every field has a default, so a partial
/// JSON document (or none at all) is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Tasks per column page.
    pub page_size: u32,
    pub list_stale_ms: u64,
    pub page_stale_ms: u64,
    pub gc_ms: u64,
    /// Quiet period before typed search text is committed.
    pub debounce_ms: u64,
    pub read_retry: RetryPolicy,
    pub mutation_retry: RetryPolicy,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            list_stale_ms: 5 * 60 * 1_000,
            page_stale_ms: 0,
            gc_ms: 5 * 60 * 1_000,
            debounce_ms: 300,
            read_retry: RetryPolicy::reads(),
            mutation_retry: RetryPolicy::mutations(),
        }
    }
}

impl BoardConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        for (name, policy) in [("read_retry", &self.read_retry), ("mutation_retry", &self.mutation_retry)] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name}.max_attempts must be at least 1"
                )));
            }
            if policy.multiplier < 1.0 || !(0.0..1.0).contains(&policy.jitter) {
                return Err(ConfigError::Invalid(format!(
                    "{name} needs multiplier >= 1 and 0 <= jitter < 1"
                )));
            }
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            list_stale_time: Duration::from_millis(self.list_stale_ms),
            page_stale_time: Duration::from_millis(self.page_stale_ms),
            gc_time: Duration::from_millis(self.gc_ms),
            read_retry: self.read_retry.clone(),
            mutation_retry: self.mutation_retry.clone(),
        }
    }
}
