//! Store connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::keys::DEFAULT_KEY_PREFIX;

/// Connection settings for the shared store.
///
/// When `enabled` is false the gateway runs against an in-process store,
/// which is only correct for a single instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub enabled: bool,
    pub url: String,
    pub pool_size: usize,
    /// Pool wait/create/recycle timeout in milliseconds.
    pub timeout_ms: u64,
    /// Upper bound on any single store operation.
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
    pub key_prefix: String,
    /// How often the in-process store sweeps expired entries.
    #[serde(with = "humantime_serde")]
    pub memory_cleanup_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_url(),
            pool_size: default_pool_size(),
            timeout_ms: default_timeout_ms(),
            command_timeout: default_command_timeout(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            memory_cleanup_interval: default_memory_cleanup_interval(),
        }
    }
}

fn default_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    16
}

fn default_timeout_ms() -> u64 {
    500
}

fn default_command_timeout() -> Duration {
    Duration::from_millis(250)
}

fn default_memory_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

impl StoreConfig {
    /// Checks the settings for obvious mistakes.
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled {
            if self.url.trim().is_empty() {
                return Err("store.url must not be empty when the store is enabled".into());
            }
            if self.pool_size == 0 {
                return Err("store.pool_size must be greater than 0".into());
            }
        }
        if self.command_timeout.is_zero() {
            return Err("store.command_timeout must be greater than 0".into());
        }
        if self.memory_cleanup_interval.is_zero() {
            return Err("store.memory_cleanup_interval must be greater than 0".into());
        }
        Ok(())
    }
}
