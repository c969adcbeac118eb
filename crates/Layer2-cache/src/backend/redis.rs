//! Redis distributed backend
//!
//! Expiry is delegated to Redis (`SET .. PX`), so `cleanup_expired` has
//! nothing to sweep. Commands run on the blocking pool over one shared
//! synchronous connection, reopened after any command error.

use super::{BackendStats, CacheBackend, Payload, TierKind};
use async_trait::async_trait;
use redis::{Client, Commands, Connection};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use voxgate_foundation::{CacheKey, DistributedTierConfig, Error, Result};

const TIER: &str = "distributed";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Redis rejects expire times that overflow when added to its clock
const MAX_PX_MS: u64 = (i64::MAX / 2) as u64;

/// Shared tier on a Redis server
#[derive(Clone)]
pub struct RedisBackend {
    client: Arc<Client>,
    conn: Arc<Mutex<Option<Connection>>>,
    prefix: String,
    default_ttl: Option<Duration>,
}

fn redis_err(e: redis::RedisError) -> Error {
    Error::backend(TIER, e.to_string())
}

fn namespaced(prefix: &str, key: &CacheKey) -> String {
    format!("{}{}", prefix, key.as_str())
}

/// `PX` argument for a TTL; PX 0 is rejected by the server
fn px_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, MAX_PX_MS)
}

impl RedisBackend {
    /// Connect and verify the server answers `PING`
    pub async fn connect(config: &DistributedTierConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            Error::invalid_config("cache.distributed.url", "required for the distributed tier")
        })?;
        let client = Client::open(url).map_err(redis_err)?;

        let backend = Self {
            client: Arc::new(client),
            conn: Arc::new(Mutex::new(None)),
            prefix: config.key_prefix.clone(),
            default_ttl: config.default_ttl(),
        };

        let pong: String = backend
            .run("ping", |con, _| redis::cmd("PING").query(con).map_err(redis_err))
            .await?;
        info!(prefix = %backend.prefix, reply = %pong, "Connected to distributed cache");
        Ok(backend)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn namespaced(&self, key: &CacheKey) -> String {
        namespaced(&self.prefix, key)
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &str) -> Result<T> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let conn = Arc::clone(&self.conn);
        let prefix = self.prefix.clone();
        tokio::task::spawn_blocking(move || {
            let mut slot = conn.lock();
            let mut con = match slot.take() {
                Some(con) => con,
                None => client
                    .get_connection_with_timeout(CONNECT_TIMEOUT)
                    .map_err(redis_err)?,
            };
            let result = f(&mut con, &prefix);
            // 에러 난 연결은 버리고 다음 호출에서 다시 연결
            if result.is_ok() {
                *slot = Some(con);
            }
            result
        })
        .await
        .map_err(|e| Error::backend(TIER, format!("{} task failed: {}", op, e)))?
    }

    /// Every key under this backend's prefix
    fn scan_keys(con: &mut Connection, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}*", prefix);
        let keys: Vec<String> = con.scan_match(pattern).map_err(redis_err)?.collect();
        Ok(keys)
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("prefix", &self.prefix)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn kind(&self) -> TierKind {
        TierKind::Distributed
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>> {
        let name = self.namespaced(key);
        let value: Option<Vec<u8>> = self
            .run("get", move |con, _| {
                redis::cmd("GET").arg(&name).query(con).map_err(redis_err)
            })
            .await?;
        Ok(value.map(Payload::from))
    }

    async fn put(&self, key: &CacheKey, payload: Payload, ttl: Option<Duration>) -> Result<bool> {
        let name = self.namespaced(key);
        let short = key.short().to_string();
        self.run("put", move |con, _| {
            let mut cmd = redis::cmd("SET");
            cmd.arg(&name).arg(&payload[..]);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(px_millis(ttl));
            }
            cmd.query::<()>(con).map_err(redis_err)?;
            debug!(tier = TIER, key = %short, size_bytes = payload.len(), "Stored entry");
            Ok(true)
        })
        .await
    }

    async fn has(&self, key: &CacheKey) -> Result<bool> {
        let name = self.namespaced(key);
        self.run("has", move |con, _| con.exists(&name).map_err(redis_err))
            .await
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        let name = self.namespaced(key);
        self.run("remove", move |con, _| {
            let removed: i64 = con.del(&name).map_err(redis_err)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.run("clear", |con, prefix| {
            let keys = Self::scan_keys(con, prefix)?;
            if !keys.is_empty() {
                let _: i64 = con.del(&keys).map_err(redis_err)?;
            }
            Ok(())
        })
        .await
    }

    async fn stats(&self) -> Result<BackendStats> {
        self.run("stats", |con, prefix| {
            let keys = Self::scan_keys(con, prefix)?;
            let mut total_bytes = 0u64;
            for key in &keys {
                let len: u64 = con.strlen(key).map_err(redis_err)?;
                total_bytes += len;
            }
            Ok(BackendStats {
                tier: TierKind::Distributed.to_string(),
                entries: keys.len() as u64,
                total_bytes,
                available: true,
                ..Default::default()
            })
        })
        .await
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        Ok(0)
    }
}
