//! # voxgate-cache
//!
//! Multi-tier audio cache.
//!
//! - [`backend`]: memory LRU, SQLite and (feature `distributed`) Redis backends
//! - [`TieredCache`]: priority lookup with warm-through and failure isolation
//! - [`spawn_cleanup_task`]: periodic expiry sweeps
//!
//! ```ignore
//! use voxgate_cache::TieredCache;
//! use voxgate_foundation::CacheConfig;
//!
//! let cache = TieredCache::from_config(CacheConfig::default()).await?;
//! let key = cache.put("안녕하세요", audio_bytes).await;
//! assert!(cache.get("안녕하세요").await.is_some());
//! ```

pub mod backend;
pub mod cleanup;
pub mod stats;
pub mod tiered;

pub use backend::{
    BackendStats, CacheBackend, CacheEntry, EntryMetadata, MemoryBackend, Payload,
    SqliteBackend, TierKind,
};
#[cfg(feature = "distributed")]
pub use backend::RedisBackend;
pub use cleanup::{spawn_cleanup_task, CleanupHandle};
pub use stats::{CacheReport, CleanupReport, TierCounterSnapshot, TierCounters, TierReport};
pub use tiered::{TieredCache, TieredCacheBuilder};
