//! SQLite persistent backend
//!
//! 한 개의 테이블(`audio_cache`)에 오디오를 저장한다.
//! - `get`: 읽기와 accessed_at / access_count 갱신을 같은 트랜잭션에서 수행
//! - `put`: upsert 후 가장 오래 접근되지 않은 row부터 삭제해 한도를 맞춤
//!
//! Every call runs on tokio's blocking pool so async callers never block on
//! SQLite I/O.

use super::{BackendStats, CacheBackend, Payload, TierKind};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};
use voxgate_foundation::{CacheKey, Error, PersistentTierConfig, Result};

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 1;

const TIER: &str = "persistent";

/// Row metadata without the payload
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    pub key: CacheKey,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub size_bytes: u64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Persistent tier backed by a single SQLite table
pub struct SqliteBackend {
    inner: Arc<SqliteInner>,
    path: Option<PathBuf>,
    default_ttl: Option<Duration>,
}

struct SqliteInner {
    conn: Mutex<Connection>,
    max_size: usize,
    max_bytes: u64,
    /// Last issued access stamp (µs); keeps LRU order strict within a process
    last_stamp: AtomicI64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    rejected: AtomicU64,
}

impl SqliteBackend {
    /// Open (or create) the database at the configured path
    pub fn open(config: &PersistentTierConfig) -> Result<Self> {
        let path = config.resolved_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create data directory: {}", e)))?;
        }

        let conn = Connection::open(&path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;

        let backend = Self::from_connection(conn, config, Some(path.clone()))?;
        info!(path = %path.display(), "Opened persistent audio cache");
        Ok(backend)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory(config: &PersistentTierConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;
        Self::from_connection(conn, config, None)
    }

    fn from_connection(
        conn: Connection,
        config: &PersistentTierConfig,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        initialize_schema(&conn)?;
        Ok(Self {
            inner: Arc::new(SqliteInner {
                conn: Mutex::new(conn),
                max_size: config.max_size,
                max_bytes: config.max_bytes,
                last_stamp: AtomicI64::new(0),
                evictions: AtomicU64::new(0),
                expirations: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }),
            path,
            default_ttl: config.default_ttl(),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get current schema version from database
    pub async fn schema_version(&self) -> Result<i32> {
        self.run("schema_version", |inner| {
            let conn = inner.lock()?;
            conn.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::Storage(format!("Failed to get schema version: {}", e)))
        })
        .await
    }

    /// Row metadata (does not count as an access)
    pub async fn metadata(&self, key: &CacheKey) -> Result<Option<EntryMetadata>> {
        let key = key.clone();
        self.run("metadata", move |inner| {
            let conn = inner.lock()?;
            conn.query_row(
                r#"
                SELECT created_at, accessed_at, access_count, size_bytes, expires_at
                FROM audio_cache WHERE cache_key = ?1
                "#,
                params![key.as_str()],
                |row| {
                    Ok(EntryMetadata {
                        key: key.clone(),
                        created_at: from_micros(row.get(0)?),
                        accessed_at: from_micros(row.get(1)?),
                        access_count: row.get::<_, i64>(2)?.max(0) as u64,
                        size_bytes: row.get::<_, i64>(3)?.max(0) as u64,
                        expires_at: row.get::<_, Option<i64>>(4)?.map(from_micros),
                    })
                },
            )
            .optional()
            .map_err(Error::from)
        })
        .await
    }

    /// Run a closure against the connection on the blocking pool
    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteInner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| Error::backend(TIER, format!("{} task failed: {}", op, e)))?
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("max_size", &self.inner.max_size)
            .field("max_bytes", &self.inner.max_bytes)
            .finish()
    }
}

impl SqliteInner {
    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }

    /// Wall-clock microseconds, strictly increasing across calls
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let mut prev = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self.last_stamp.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Delete least-recently-accessed rows (never `keep`) until both ceilings hold
    fn enforce_limits(&self, tx: &Transaction<'_>, keep: &CacheKey) -> Result<usize> {
        let (mut count, mut total): (i64, i64) = tx.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM audio_cache",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let within = |count: i64, total: i64| {
            count as u64 <= self.max_size as u64 && total as u64 <= self.max_bytes
        };
        if within(count, total) {
            return Ok(0);
        }

        let victims: Vec<(String, i64)> = {
            let mut stmt = tx.prepare(
                "SELECT cache_key, size_bytes FROM audio_cache WHERE cache_key != ?1 ORDER BY accessed_at ASC",
            )?;
            let rows = stmt.query_map(params![keep.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let mut victims = Vec::new();
            for row in rows {
                let (victim, size): (String, i64) = row?;
                if within(count, total) {
                    break;
                }
                count -= 1;
                total -= size;
                victims.push((victim, size));
            }
            victims
        };

        for (victim, size) in &victims {
            tx.execute("DELETE FROM audio_cache WHERE cache_key = ?1", params![victim])?;
            debug!(
                tier = TIER,
                key = &victim[..victim.len().min(12)],
                size_bytes = size,
                entries = count,
                total_bytes = total,
                "Evicted LRU row"
            );
        }
        self.evictions
            .fetch_add(victims.len() as u64, Ordering::Relaxed);
        Ok(victims.len())
    }
}

/// Initialize database schema
fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Audio payloads keyed by SHA-256 of the request text
        CREATE TABLE IF NOT EXISTS audio_cache (
            cache_key TEXT PRIMARY KEY,
            payload BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            accessed_at INTEGER NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 0,
            size_bytes INTEGER NOT NULL,
            expires_at INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_audio_cache_accessed
            ON audio_cache(accessed_at);
        CREATE INDEX IF NOT EXISTS idx_audio_cache_expires
            ON audio_cache(expires_at);
        "#,
    )
    .map_err(|e| Error::Storage(format!("Failed to initialize schema: {}", e)))?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        params![CURRENT_SCHEMA_VERSION],
    )
    .map_err(|e| Error::Storage(format!("Failed to record schema version: {}", e)))?;

    Ok(())
}

fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

fn from_micros(micros: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(micros).single().unwrap_or_default()
}

fn ttl_micros(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_micros()).unwrap_or(i64::MAX)
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    fn kind(&self) -> TierKind {
        TierKind::Persistent
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>> {
        let key = key.clone();
        self.run("get", move |inner| {
            let mut conn = inner.lock()?;
            let tx = conn.transaction()?;

            let row: Option<(Vec<u8>, Option<i64>)> = tx
                .query_row(
                    "SELECT payload, expires_at FROM audio_cache WHERE cache_key = ?1",
                    params![key.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let payload = match row {
                None => None,
                Some((_, Some(expires_at))) if expires_at <= now_micros() => {
                    tx.execute(
                        "DELETE FROM audio_cache WHERE cache_key = ?1",
                        params![key.as_str()],
                    )?;
                    inner.expirations.fetch_add(1, Ordering::Relaxed);
                    debug!(tier = TIER, key = key.short(), "Lazily expired row");
                    None
                }
                Some((payload, _)) => {
                    tx.execute(
                        r#"
                        UPDATE audio_cache
                        SET accessed_at = ?2, access_count = access_count + 1
                        WHERE cache_key = ?1
                        "#,
                        params![key.as_str(), inner.next_stamp()],
                    )?;
                    Some(Payload::from(payload))
                }
            };

            tx.commit()?;
            Ok(payload)
        })
        .await
    }

    async fn put(&self, key: &CacheKey, payload: Payload, ttl: Option<Duration>) -> Result<bool> {
        let key = key.clone();
        self.run("put", move |inner| {
            let size = payload.len() as u64;
            if size > inner.max_bytes || inner.max_size == 0 {
                inner.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(tier = TIER, key = key.short(), size_bytes = size, "Rejected oversized entry");
                return Ok(false);
            }

            let mut conn = inner.lock()?;
            let tx = conn.transaction()?;
            let stamp = inner.next_stamp();
            let expires_at = ttl.map(|ttl| now_micros().saturating_add(ttl_micros(ttl)));

            tx.execute(
                r#"
                INSERT INTO audio_cache
                    (cache_key, payload, created_at, accessed_at, access_count, size_bytes, expires_at)
                VALUES (?1, ?2, ?3, ?3, 0, ?4, ?5)
                ON CONFLICT(cache_key) DO UPDATE SET
                    payload = excluded.payload,
                    created_at = excluded.created_at,
                    accessed_at = excluded.accessed_at,
                    access_count = 0,
                    size_bytes = excluded.size_bytes,
                    expires_at = excluded.expires_at
                "#,
                params![key.as_str(), &payload[..], stamp, size as i64, expires_at],
            )?;

            inner.enforce_limits(&tx, &key)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn has(&self, key: &CacheKey) -> Result<bool> {
        let key = key.clone();
        self.run("has", move |inner| {
            let conn = inner.lock()?;
            let found = conn
                .query_row(
                    r#"
                    SELECT 1 FROM audio_cache
                    WHERE cache_key = ?1 AND (expires_at IS NULL OR expires_at > ?2)
                    "#,
                    params![key.as_str(), now_micros()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        let key = key.clone();
        self.run("remove", move |inner| {
            let conn = inner.lock()?;
            let changed = conn.execute(
                "DELETE FROM audio_cache WHERE cache_key = ?1",
                params![key.as_str()],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.run("clear", |inner| {
            let conn = inner.lock()?;
            conn.execute("DELETE FROM audio_cache", [])?;
            Ok(())
        })
        .await
    }

    async fn stats(&self) -> Result<BackendStats> {
        self.run("stats", |inner| {
            let conn = inner.lock()?;
            let (entries, total): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM audio_cache",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(BackendStats {
                tier: TierKind::Persistent.to_string(),
                entries: entries.max(0) as u64,
                total_bytes: total.max(0) as u64,
                max_entries: Some(inner.max_size as u64),
                max_bytes: Some(inner.max_bytes),
                evictions: inner.evictions.load(Ordering::Relaxed),
                expirations: inner.expirations.load(Ordering::Relaxed),
                rejected: inner.rejected.load(Ordering::Relaxed),
                available: true,
            })
        })
        .await
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        self.run("cleanup_expired", |inner| {
            let conn = inner.lock()?;
            let removed = conn.execute(
                "DELETE FROM audio_cache WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now_micros()],
            )?;
            inner
                .expirations
                .fetch_add(removed as u64, Ordering::Relaxed);
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(max_size: usize, max_bytes: u64) -> PersistentTierConfig {
        PersistentTierConfig {
            max_size,
            max_bytes,
            default_ttl_secs: None,
            ..Default::default()
        }
    }

    fn key(text: &str) -> CacheKey {
        CacheKey::from_text(text)
    }

    fn bytes(len: usize) -> Payload {
        Payload::from(vec![3u8; len])
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let backend = SqliteBackend::in_memory(&config(10, 1024)).unwrap();
        let payload = Payload::from(&b"ID3\x04audio"[..]);

        assert!(backend.put(&key("a"), payload.clone(), None).await.unwrap());
        assert_eq!(backend.get(&key("a")).await.unwrap(), Some(payload));
        assert!(backend.has(&key("a")).await.unwrap());
        assert!(backend.get(&key("missing")).await.unwrap().is_none());
        assert_eq!(backend.schema_version().await.unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_get_updates_access_metadata() {
        let backend = SqliteBackend::in_memory(&config(10, 1024)).unwrap();
        backend.put(&key("a"), bytes(5), None).await.unwrap();
        let before = backend.metadata(&key("a")).await.unwrap().unwrap();

        backend.get(&key("a")).await.unwrap();
        backend.get(&key("a")).await.unwrap();

        let after = backend.metadata(&key("a")).await.unwrap().unwrap();
        assert_eq!(before.access_count, 0);
        assert_eq!(after.access_count, 2);
        assert!(after.accessed_at > before.accessed_at);
        assert_eq!(after.size_bytes, 5);
    }

    #[tokio::test]
    async fn test_entry_ceiling_removes_least_recently_accessed() {
        let backend = SqliteBackend::in_memory(&config(2, 1024)).unwrap();
        backend.put(&key("a"), bytes(1), None).await.unwrap();
        backend.put(&key("b"), bytes(1), None).await.unwrap();
        backend.get(&key("a")).await.unwrap();
        backend.put(&key("c"), bytes(1), None).await.unwrap();

        assert!(backend.has(&key("a")).await.unwrap());
        assert!(!backend.has(&key("b")).await.unwrap());
        assert!(backend.has(&key("c")).await.unwrap());
        assert_eq!(backend.stats().await.unwrap().evictions, 1);
    }

    #[tokio::test]
    async fn test_byte_ceiling_enforced() {
        let backend = SqliteBackend::in_memory(&config(100, 100)).unwrap();
        backend.put(&key("a"), bytes(60), None).await.unwrap();
        backend.put(&key("b"), bytes(60), None).await.unwrap();

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_bytes, 60);
        assert!(backend.has(&key("b")).await.unwrap());

        assert!(!backend.put(&key("huge"), bytes(101), None).await.unwrap());
        assert_eq!(backend.stats().await.unwrap().rejected, 1);
    }

    #[tokio::test]
    async fn test_upsert_resets_row() {
        let backend = SqliteBackend::in_memory(&config(10, 1024)).unwrap();
        backend.put(&key("a"), bytes(5), None).await.unwrap();
        backend.get(&key("a")).await.unwrap();
        backend.put(&key("a"), bytes(9), None).await.unwrap();

        let meta = backend.metadata(&key("a")).await.unwrap().unwrap();
        assert_eq!(meta.size_bytes, 9);
        assert_eq!(meta.access_count, 0);
        assert_eq!(backend.stats().await.unwrap().entries, 1);
    }

    #[tokio::test]
    async fn test_expired_rows_are_misses_and_swept() {
        let backend = SqliteBackend::in_memory(&config(10, 1024)).unwrap();
        backend
            .put(&key("gone"), bytes(4), Some(Duration::ZERO))
            .await
            .unwrap();
        backend
            .put(&key("stale"), bytes(4), Some(Duration::ZERO))
            .await
            .unwrap();
        backend
            .put(&key("kept"), bytes(4), Some(Duration::from_secs(3600)))
            .await
            .unwrap();

        assert!(!backend.has(&key("gone")).await.unwrap());
        assert!(backend.get(&key("gone")).await.unwrap().is_none());
        assert_eq!(backend.cleanup_expired().await.unwrap(), 1);

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.expirations, 2);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let backend = SqliteBackend::in_memory(&config(10, 1024)).unwrap();
        backend.put(&key("a"), bytes(1), None).await.unwrap();
        backend.put(&key("b"), bytes(1), None).await.unwrap();

        assert!(backend.remove(&key("a")).await.unwrap());
        assert!(!backend.remove(&key("a")).await.unwrap());

        backend.clear().await.unwrap();
        assert_eq!(backend.stats().await.unwrap().entries, 0);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let tier = PersistentTierConfig {
            path: Some(dir.path().join("nested").join("cache.db")),
            ..config(10, 1024)
        };

        {
            let backend = SqliteBackend::open(&tier).unwrap();
            backend.put(&key("a"), bytes(8), None).await.unwrap();
        }

        let backend = SqliteBackend::open(&tier).unwrap();
        assert_eq!(backend.get(&key("a")).await.unwrap(), Some(bytes(8)));
        assert!(backend.path().unwrap().ends_with("cache.db"));
    }
}
