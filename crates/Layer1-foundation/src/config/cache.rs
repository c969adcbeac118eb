//! Cache configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default SQLite file name inside the data directory
pub const CACHE_DB_FILE: &str = "audio_cache.db";

/// Multi-tier cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Memory tier (always present)
    #[serde(default)]
    pub memory: MemoryTierConfig,

    /// SQLite tier
    #[serde(default)]
    pub persistent: PersistentTierConfig,

    /// Redis tier (requires the `distributed` feature of voxgate-cache)
    #[serde(default)]
    pub distributed: DistributedTierConfig,

    /// Interval between background expiry sweeps (seconds)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Log a warning when a put fails on every tier
    #[serde(default = "default_true")]
    pub warn_on_total_put_failure: bool,
}

/// Memory tier limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryTierConfig {
    /// Maximum number of entries
    #[serde(default = "default_memory_max_size")]
    pub max_size: usize,

    /// Maximum aggregate payload size in bytes
    #[serde(default = "default_memory_max_bytes")]
    pub max_memory_bytes: usize,

    /// TTL applied to puts and warm-through writes (None = no expiry)
    #[serde(default = "default_memory_ttl_secs")]
    pub default_ttl_secs: Option<u64>,
}

/// Persistent (SQLite) tier limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentTierConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database file; defaults to `<data_dir>/voxgate/audio_cache.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_persistent_max_size")]
    pub max_size: usize,

    #[serde(default = "default_persistent_max_bytes")]
    pub max_bytes: u64,

    #[serde(default = "default_persistent_ttl_secs")]
    pub default_ttl_secs: Option<u64>,
}

/// Distributed (Redis) tier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributedTierConfig {
    #[serde(default)]
    pub enabled: bool,

    /// e.g. `redis://127.0.0.1:6379/0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Namespace for every key written by this tier
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_distributed_ttl_secs")]
    pub default_ttl_secs: Option<u64>,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_cleanup_interval_secs() -> u64 {
    300
} // 5 minutes
fn default_memory_max_size() -> usize {
    1000
}
fn default_memory_max_bytes() -> usize {
    100 * 1024 * 1024
} // 100MB
fn default_memory_ttl_secs() -> Option<u64> {
    Some(3600)
}
fn default_persistent_max_size() -> usize {
    10_000
}
fn default_persistent_max_bytes() -> u64 {
    1024 * 1024 * 1024
} // 1GB
fn default_persistent_ttl_secs() -> Option<u64> {
    Some(7 * 24 * 3600)
}
fn default_key_prefix() -> String {
    "voxgate:audio:".to_string()
}
fn default_distributed_ttl_secs() -> Option<u64> {
    Some(24 * 3600)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: MemoryTierConfig::default(),
            persistent: PersistentTierConfig::default(),
            distributed: DistributedTierConfig::default(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            warn_on_total_put_failure: true,
        }
    }
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            max_size: default_memory_max_size(),
            max_memory_bytes: default_memory_max_bytes(),
            default_ttl_secs: default_memory_ttl_secs(),
        }
    }
}

impl Default for PersistentTierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            max_size: default_persistent_max_size(),
            max_bytes: default_persistent_max_bytes(),
            default_ttl_secs: default_persistent_ttl_secs(),
        }
    }
}

impl Default for DistributedTierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            key_prefix: default_key_prefix(),
            default_ttl_secs: default_distributed_ttl_secs(),
        }
    }
}

impl CacheConfig {
    /// Memory-only config for resource-constrained environments
    pub fn minimal() -> Self {
        Self {
            memory: MemoryTierConfig {
                max_size: 100,
                max_memory_bytes: 16 * 1024 * 1024,
                default_ttl_secs: Some(900),
            },
            persistent: PersistentTierConfig {
                enabled: false,
                ..Default::default()
            },
            distributed: DistributedTierConfig::default(),
            cleanup_interval_secs: 60,
            warn_on_total_put_failure: true,
        }
    }

    /// Large memory tier and long-lived persistent tier
    pub fn performance() -> Self {
        Self {
            memory: MemoryTierConfig {
                max_size: 5000,
                max_memory_bytes: 512 * 1024 * 1024,
                default_ttl_secs: Some(4 * 3600),
            },
            persistent: PersistentTierConfig {
                max_size: 100_000,
                max_bytes: 8 * 1024 * 1024 * 1024,
                default_ttl_secs: Some(30 * 24 * 3600),
                ..Default::default()
            },
            distributed: DistributedTierConfig::default(),
            cleanup_interval_secs: 600,
            warn_on_total_put_failure: true,
        }
    }

    /// Get cleanup interval as Duration
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory.max_size == 0 {
            return Err(Error::invalid_config("cache.memory.maxSize", "must be > 0"));
        }
        if self.memory.max_memory_bytes == 0 {
            return Err(Error::invalid_config(
                "cache.memory.maxMemoryBytes",
                "must be > 0",
            ));
        }
        if self.persistent.enabled && (self.persistent.max_size == 0 || self.persistent.max_bytes == 0)
        {
            return Err(Error::invalid_config(
                "cache.persistent",
                "maxSize and maxBytes must be > 0 when enabled",
            ));
        }
        if self.distributed.enabled && self.distributed.url.is_none() {
            return Err(Error::invalid_config(
                "cache.distributed.url",
                "required when the distributed tier is enabled",
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(Error::invalid_config(
                "cache.cleanupIntervalSecs",
                "must be > 0",
            ));
        }
        Ok(())
    }
}

impl MemoryTierConfig {
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }
}

impl PersistentTierConfig {
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    /// Configured path, or the per-user data directory
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join("voxgate"))
            .unwrap_or_else(|| PathBuf::from(".voxgate"))
            .join(CACHE_DB_FILE)
    }
}

impl DistributedTierConfig {
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }
}
