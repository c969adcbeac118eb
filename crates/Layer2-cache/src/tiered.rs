//! Multi-tier cache orchestrator
//!
//! Tiers are probed in strict priority order (memory → persistent →
//! distributed):
//! 1. 첫 번째 hit에서 반환
//! 2. 하위 tier hit이면 상위 tier 전부에 warm-through (각 tier의 default TTL)
//! 3. 모든 tier miss면 `None`
//!
//! Backend failures are logged and counted per tier but never surface to the
//! caller: a failed probe falls through to the next tier and a failed write
//! only costs a future miss.

use crate::backend::{CacheBackend, MemoryBackend, Payload, SqliteBackend, TierKind};
use crate::stats::{hit_rate, CacheReport, CleanupReport, TierCounters, TierReport};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use voxgate_foundation::{CacheConfig, CacheKey, Result};

struct Tier {
    backend: Arc<dyn CacheBackend>,
    counters: TierCounters,
}

impl Tier {
    fn kind(&self) -> TierKind {
        self.backend.kind()
    }
}

/// Composes backends in priority order
pub struct TieredCache {
    config: CacheConfig,
    tiers: Vec<Tier>,
    lookups: AtomicU64,
    hits: AtomicU64,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("tiers", &self.tier_kinds())
            .finish()
    }
}

/// Builder for [`TieredCache`] with explicit backends
pub struct TieredCacheBuilder {
    config: CacheConfig,
    backends: Vec<Arc<dyn CacheBackend>>,
}

impl TieredCacheBuilder {
    pub fn backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn build(self) -> TieredCache {
        let mut tiers: Vec<Tier> = self
            .backends
            .into_iter()
            .map(|backend| Tier {
                backend,
                counters: TierCounters::default(),
            })
            .collect();
        // stable: two backends of the same kind keep insertion order
        tiers.sort_by_key(Tier::kind);

        TieredCache {
            config: self.config,
            tiers,
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }
}

impl TieredCache {
    pub fn builder(config: CacheConfig) -> TieredCacheBuilder {
        TieredCacheBuilder {
            config,
            backends: Vec::new(),
        }
    }

    /// Open every configured tier
    ///
    /// The memory tier is always present. A persistent or distributed tier
    /// that cannot be opened is left out with a warning.
    pub async fn from_config(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Self::builder(config.clone())
            .backend(Arc::new(MemoryBackend::new(&config.memory)));

        if config.persistent.enabled {
            match SqliteBackend::open(&config.persistent) {
                Ok(sqlite) => builder = builder.backend(Arc::new(sqlite)),
                Err(e) => warn!(
                    tier = %TierKind::Persistent,
                    error = %e,
                    "Persistent tier unavailable, continuing without it"
                ),
            }
        }

        if config.distributed.enabled {
            builder = Self::attach_distributed(builder, &config).await;
        }

        let cache = builder.build();
        info!(tiers = ?cache.tier_kinds(), "Audio cache ready");
        Ok(cache)
    }

    #[cfg(feature = "distributed")]
    async fn attach_distributed(
        builder: TieredCacheBuilder,
        config: &CacheConfig,
    ) -> TieredCacheBuilder {
        match crate::backend::RedisBackend::connect(&config.distributed).await {
            Ok(redis) => builder.backend(Arc::new(redis)),
            Err(e) => {
                warn!(
                    tier = %TierKind::Distributed,
                    error = %e,
                    "Distributed tier unavailable, continuing without it"
                );
                builder
            }
        }
    }

    #[cfg(not(feature = "distributed"))]
    async fn attach_distributed(
        builder: TieredCacheBuilder,
        _config: &CacheConfig,
    ) -> TieredCacheBuilder {
        warn!(
            tier = %TierKind::Distributed,
            "Distributed tier enabled but voxgate-cache was built without the `distributed` feature"
        );
        builder
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Configured tiers in probe order
    pub fn tier_kinds(&self) -> Vec<TierKind> {
        self.tiers.iter().map(Tier::kind).collect()
    }

    /// Direct access to one backend
    pub fn backend(&self, kind: TierKind) -> Option<Arc<dyn CacheBackend>> {
        self.tiers
            .iter()
            .find(|t| t.kind() == kind)
            .map(|t| Arc::clone(&t.backend))
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Cached audio for `text`
    pub async fn get(&self, text: &str) -> Option<Payload> {
        self.get_by_key(&CacheKey::from_text(text)).await
    }

    pub async fn get_by_key(&self, key: &CacheKey) -> Option<Payload> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        for (idx, tier) in self.tiers.iter().enumerate() {
            match tier.backend.get(key).await {
                Ok(Some(payload)) => {
                    tier.counters.record_hit();
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(tier = %tier.kind(), key = key.short(), "Cache hit");
                    self.warm_through(&self.tiers[..idx], key, &payload).await;
                    return Some(payload);
                }
                Ok(None) => tier.counters.record_miss(),
                Err(e) => {
                    tier.counters.record_error();
                    warn!(
                        tier = %tier.kind(),
                        key = key.short(),
                        error = %e,
                        "Cache probe failed, falling through"
                    );
                }
            }
        }

        debug!(key = key.short(), "Cache miss on every tier");
        None
    }

    /// Copy a lower-tier hit into every faster tier
    async fn warm_through(&self, faster: &[Tier], key: &CacheKey, payload: &Payload) {
        for tier in faster {
            let ttl = tier.backend.default_ttl();
            match tier.backend.put(key, Arc::clone(payload), ttl).await {
                Ok(true) => {
                    tier.counters.record_promotion();
                    debug!(tier = %tier.kind(), key = key.short(), "Warmed faster tier");
                }
                Ok(false) => {
                    debug!(tier = %tier.kind(), key = key.short(), "Faster tier refused warm-through");
                }
                Err(e) => {
                    tier.counters.record_error();
                    warn!(tier = %tier.kind(), key = key.short(), error = %e, "Warm-through failed");
                }
            }
        }
    }

    /// True if any tier holds the entry
    pub async fn has(&self, text: &str) -> bool {
        let key = CacheKey::from_text(text);
        for tier in &self.tiers {
            match tier.backend.has(&key).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    tier.counters.record_error();
                    warn!(tier = %tier.kind(), key = key.short(), error = %e, "Cache has() failed");
                }
            }
        }
        false
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Store audio in every tier and return its key
    ///
    /// The key is returned even if some or all tier writes failed.
    pub async fn put(&self, text: &str, payload: impl Into<Payload>) -> CacheKey {
        let key = CacheKey::from_text(text);
        self.store(&key, payload.into()).await;
        key
    }

    /// Write to every tier, returning how many accepted the entry
    async fn store(&self, key: &CacheKey, payload: Payload) -> usize {
        let mut stored = 0;
        for tier in &self.tiers {
            let ttl = tier.backend.default_ttl();
            match tier.backend.put(key, Arc::clone(&payload), ttl).await {
                Ok(true) => {
                    tier.counters.record_put();
                    stored += 1;
                }
                Ok(false) => {
                    debug!(tier = %tier.kind(), key = key.short(), size_bytes = payload.len(), "Tier refused entry");
                }
                Err(e) => {
                    tier.counters.record_error();
                    warn!(tier = %tier.kind(), key = key.short(), error = %e, "Cache put failed");
                }
            }
        }

        if stored == 0 && self.config.warn_on_total_put_failure {
            warn!(
                key = key.short(),
                size_bytes = payload.len(),
                tiers = self.tiers.len(),
                "Entry was not stored in any tier"
            );
        }
        stored
    }

    /// Bulk insert; counts pairs accepted by at least one tier
    pub async fn warm<I, T, P>(&self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (T, P)>,
        T: AsRef<str>,
        P: Into<Payload>,
    {
        let mut warmed = 0;
        let mut total = 0;
        for (text, payload) in pairs {
            total += 1;
            let key = CacheKey::from_text(text.as_ref());
            if self.store(&key, payload.into()).await > 0 {
                warmed += 1;
            }
        }
        info!(warmed, total, "Cache warming finished");
        warmed
    }

    /// Remove from every tier; true if any tier held it
    pub async fn remove(&self, text: &str) -> bool {
        let key = CacheKey::from_text(text);
        let mut removed = false;
        for tier in &self.tiers {
            match tier.backend.remove(&key).await {
                Ok(hit) => removed |= hit,
                Err(e) => {
                    tier.counters.record_error();
                    warn!(tier = %tier.kind(), key = key.short(), error = %e, "Cache remove failed");
                }
            }
        }
        removed
    }

    /// Clear every tier and reset counters
    pub async fn clear(&self) {
        for tier in &self.tiers {
            if let Err(e) = tier.backend.clear().await {
                warn!(tier = %tier.kind(), error = %e, "Cache clear failed");
            }
            tier.counters.reset();
        }
        self.lookups.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        info!("Cache cleared");
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Sweep expired entries from every tier
    pub async fn cleanup_expired(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for tier in &self.tiers {
            match tier.backend.cleanup_expired().await {
                Ok(removed) => {
                    report.removed += removed;
                    report.per_tier.push((tier.kind(), removed));
                }
                Err(e) => {
                    tier.counters.record_error();
                    report.failed_tiers.push(tier.kind());
                    warn!(tier = %tier.kind(), error = %e, "Expiry sweep failed");
                }
            }
        }
        if report.removed > 0 {
            debug!(removed = report.removed, "Removed expired entries");
        }
        report
    }

    /// Config, per-tier counters and backend stats in one report
    pub async fn comprehensive_stats(&self) -> CacheReport {
        let mut tiers = Vec::with_capacity(self.tiers.len());
        for tier in &self.tiers {
            let backend = match tier.backend.stats().await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!(tier = %tier.kind(), error = %e, "Backend stats unavailable");
                    None
                }
            };
            tiers.push(TierReport {
                tier: tier.kind(),
                counters: tier.counters.snapshot(),
                backend,
            });
        }

        let lookups = self.lookups.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        CacheReport {
            config: self.config.clone(),
            tiers,
            lookups,
            hits,
            hit_rate: hit_rate(hits, lookups.saturating_sub(hits)),
            generated_at: Utc::now(),
        }
    }
}
