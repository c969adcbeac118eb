//! Cache statistics
//!
//! Per-tier counters kept by the orchestrator plus the serializable report
//! returned by `TieredCache::comprehensive_stats`.

use crate::backend::{BackendStats, TierKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use voxgate_foundation::CacheConfig;

/// Hit rate as hits / (hits + misses), 0.0 when nothing was looked up
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

// ============================================================================
// Counters
// ============================================================================

/// Orchestrator-side counters for one tier
#[derive(Debug, Default)]
pub struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    errors: AtomicU64,
    promotions: AtomicU64,
}

impl TierCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Warm-through write into this tier
    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.puts.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TierCounterSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        TierCounterSnapshot {
            hits,
            misses,
            puts: self.puts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            hit_rate: hit_rate(hits, misses),
        }
    }
}

/// Point-in-time copy of [`TierCounters`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierCounterSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub errors: u64,
    pub promotions: u64,
    pub hit_rate: f64,
}

// ============================================================================
// Reports
// ============================================================================

/// One tier in the comprehensive report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierReport {
    pub tier: TierKind,
    pub counters: TierCounterSnapshot,
    /// `None` when the backend's own stats call failed
    pub backend: Option<BackendStats>,
}

/// Everything the cache knows about itself
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheReport {
    pub config: CacheConfig,
    pub tiers: Vec<TierReport>,
    /// Calls to `get`
    pub lookups: u64,
    /// Calls to `get` answered by any tier
    pub hits: u64,
    pub hit_rate: f64,
    pub generated_at: DateTime<Utc>,
}

impl CacheReport {
    pub fn tier(&self, kind: TierKind) -> Option<&TierReport> {
        self.tiers.iter().find(|t| t.tier == kind)
    }

    pub fn total_entries(&self) -> u64 {
        self.tiers
            .iter()
            .filter_map(|t| t.backend.as_ref())
            .map(|b| b.entries)
            .sum()
    }
}

/// Result of one expiry sweep over all tiers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed: usize,
    pub per_tier: Vec<(TierKind, usize)>,
    pub failed_tiers: Vec<TierKind>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed_tiers.is_empty()
    }
}
