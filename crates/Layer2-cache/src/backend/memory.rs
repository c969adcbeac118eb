//! In-memory LRU backend
//!
//! Recency is tracked with a monotonically increasing access counter. The
//! `order` map is keyed by that counter, so the first entry is always the
//! least recently used one and eviction does not scan the whole cache.

use super::{BackendStats, CacheBackend, CacheEntry, Payload, TierKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use voxgate_foundation::{CacheKey, MemoryTierConfig, Result};

/// Memory tier with entry-count and byte ceilings
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    max_size: usize,
    max_bytes: usize,
    default_ttl: Option<Duration>,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<CacheKey, MemoryEntry>,
    /// access sequence -> key, oldest first
    order: BTreeMap<u64, CacheKey>,
    access_counter: u64,
    current_bytes: usize,
    evictions: u64,
    expirations: u64,
    rejected: u64,
}

#[derive(Debug)]
struct MemoryEntry {
    entry: CacheEntry,
    last_access: u64,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl MemoryState {
    fn next_access(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    fn touch(&mut self, key: &CacheKey) {
        let seq = self.next_access();
        if let Some(slot) = self.entries.get_mut(key) {
            self.order.remove(&slot.last_access);
            slot.last_access = seq;
            slot.entry.access_count += 1;
            self.order.insert(seq, key.clone());
        }
    }

    fn remove_entry(&mut self, key: &CacheKey) -> Option<MemoryEntry> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.last_access);
        self.current_bytes = self.current_bytes.saturating_sub(slot.entry.size_bytes);
        Some(slot)
    }

    /// Evict the least recently used entry
    fn evict_lru(&mut self) -> Option<MemoryEntry> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.entries.remove(&key)?;
        self.current_bytes = self.current_bytes.saturating_sub(slot.entry.size_bytes);
        self.evictions += 1;
        Some(slot)
    }

    fn insert(&mut self, entry: CacheEntry, expires_at: Option<Instant>) {
        let seq = self.next_access();
        self.current_bytes += entry.size_bytes;
        self.order.insert(seq, entry.key.clone());
        self.entries.insert(
            entry.key.clone(),
            MemoryEntry {
                entry,
                last_access: seq,
                expires_at,
            },
        );
    }
}

impl MemoryBackend {
    pub fn new(config: &MemoryTierConfig) -> Self {
        Self::with_limits(config.max_size, config.max_memory_bytes, config.default_ttl())
    }

    pub fn with_limits(max_size: usize, max_bytes: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            max_size,
            max_bytes,
            default_ttl,
        }
    }

    /// Insert a prepared entry, evicting LRU entries until both ceilings hold
    pub fn insert_entry(&self, entry: CacheEntry) -> bool {
        let now = Instant::now();
        // A TTL past the clock's range never expires
        let expires_at = entry.ttl.and_then(|ttl| now.checked_add(ttl));
        let size = entry.size_bytes;

        let mut state = self.state.lock();

        // Same-key entry goes first so its bytes are not counted twice
        state.remove_entry(&entry.key);

        if size > self.max_bytes || self.max_size == 0 {
            state.rejected += 1;
            debug!(
                tier = "memory",
                key = entry.key.short(),
                size_bytes = size,
                max_bytes = self.max_bytes,
                "Rejected oversized entry"
            );
            return false;
        }

        while !state.entries.is_empty()
            && (state.entries.len() + 1 > self.max_size
                || state.current_bytes + size > self.max_bytes)
        {
            let Some(evicted) = state.evict_lru() else {
                break;
            };
            debug!(
                tier = "memory",
                key = evicted.entry.key.short(),
                size_bytes = evicted.entry.size_bytes,
                entries = state.entries.len(),
                total_bytes = state.current_bytes,
                evictions = state.evictions,
                "Evicted LRU entry"
            );
        }

        state.insert(entry, expires_at);
        true
    }

    /// Snapshot of an entry without refreshing its recency
    pub fn peek_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let state = self.state.lock();
        state
            .entries
            .get(key)
            .filter(|slot| !slot.is_expired(Instant::now()))
            .map(|slot| slot.entry.clone())
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn current_bytes(&self) -> usize {
        self.state.lock().current_bytes
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn kind(&self) -> TierKind {
        TierKind::Memory
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired = match state.entries.get(key) {
            None => return Ok(None),
            Some(slot) => slot.is_expired(now),
        };

        if expired {
            state.remove_entry(key);
            state.expirations += 1;
            debug!(tier = "memory", key = key.short(), "Lazily expired entry");
            return Ok(None);
        }

        state.touch(key);
        Ok(state.entries.get(key).map(|slot| slot.entry.payload.clone()))
    }

    async fn put(&self, key: &CacheKey, payload: Payload, ttl: Option<Duration>) -> Result<bool> {
        Ok(self.insert_entry(CacheEntry::new(key.clone(), payload, ttl)))
    }

    async fn has(&self, key: &CacheKey) -> Result<bool> {
        let state = self.state.lock();
        Ok(state
            .entries
            .get(key)
            .is_some_and(|slot| !slot.is_expired(Instant::now())))
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.state.lock().remove_entry(key).is_some())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
        state.current_bytes = 0;
        Ok(())
    }

    async fn stats(&self) -> Result<BackendStats> {
        let state = self.state.lock();
        Ok(BackendStats {
            tier: TierKind::Memory.to_string(),
            entries: state.entries.len() as u64,
            total_bytes: state.current_bytes as u64,
            max_entries: Some(self.max_size as u64),
            max_bytes: Some(self.max_bytes as u64),
            evictions: state.evictions,
            expirations: state.expirations,
            rejected: state.rejected,
            available: true,
        })
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, slot)| slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove_entry(key);
        }
        state.expirations += expired.len() as u64;
        Ok(expired.len())
    }
}
