//! Cache backends
//!
//! One backend per storage medium, all behind [`CacheBackend`]:
//! - [`MemoryBackend`]: access-ordered LRU with byte accounting and per-entry TTL
//! - [`SqliteBackend`]: persistent table, LRU by `accessed_at`
//! - `RedisBackend`: shared tier using native key expiry (feature `distributed`)

mod memory;
#[cfg(feature = "distributed")]
mod redis;
mod sqlite;

pub use memory::MemoryBackend;
#[cfg(feature = "distributed")]
pub use self::redis::RedisBackend;
pub use sqlite::{EntryMetadata, SqliteBackend};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use voxgate_foundation::{CacheKey, Result};

/// Opaque audio bytes shared between tiers without copying
pub type Payload = Arc<[u8]>;

// ============================================================================
// TierKind
// ============================================================================

/// Position of a backend in the lookup chain (declaration order = priority)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Memory,
    Persistent,
    Distributed,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Memory => "memory",
            TierKind::Persistent => "persistent",
            TierKind::Distributed => "distributed",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CacheEntry
// ============================================================================

/// A cached payload and its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    pub access_count: u64,
    /// Equals `payload.len()` unless overridden with [`CacheEntry::with_size`]
    pub size_bytes: usize,
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, payload: Payload, ttl: Option<Duration>) -> Self {
        let size_bytes = payload.len();
        Self {
            key,
            payload,
            created_at: Utc::now(),
            access_count: 0,
            size_bytes,
            ttl,
        }
    }

    /// Override the accounted size
    pub fn with_size(mut self, size_bytes: usize) -> Self {
        self.size_bytes = size_bytes;
        self
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Backend-reported statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStats {
    pub tier: String,
    pub entries: u64,
    pub total_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<u64>,
    pub evictions: u64,
    pub expirations: u64,
    /// Puts refused because the payload alone exceeds the byte ceiling
    pub rejected: u64,
    pub available: bool,
}

impl BackendStats {
    /// Byte utilization (0.0 - 1.0, or 0 if unbounded)
    pub fn memory_utilization(&self) -> f64 {
        match self.max_bytes {
            Some(max) if max > 0 => self.total_bytes as f64 / max as f64,
            _ => 0.0,
        }
    }
}

// ============================================================================
// CacheBackend Trait
// ============================================================================

/// Uniform contract over one storage medium
///
/// Implementations must be safe under concurrent calls. `ttl = None` stores
/// the entry without expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Tier this backend serves
    fn kind(&self) -> TierKind;

    /// TTL used when the orchestrator writes without an explicit TTL
    fn default_ttl(&self) -> Option<Duration>;

    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>>;

    /// Store a payload; `Ok(false)` when the backend refuses it
    async fn put(&self, key: &CacheKey, payload: Payload, ttl: Option<Duration>) -> Result<bool>;

    async fn has(&self, key: &CacheKey) -> Result<bool>;

    async fn remove(&self, key: &CacheKey) -> Result<bool>;

    async fn clear(&self) -> Result<()>;

    async fn stats(&self) -> Result<BackendStats>;

    /// Drop expired entries, returning how many were removed
    async fn cleanup_expired(&self) -> Result<usize>;
}
