use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Single-key atomic marker operations.
#[async_trait]
pub trait MarkerCache: Send + Sync {
    /// Stores `value` under `key` for `ttl` unless the key already exists.
    /// Returns whether this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, CacheError>;
}

#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl MarkerCache for RedisCache {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        // SET NX replies OK when it wrote the key and nil when the key existed.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
}

/// Entry count below which expired markers are only replaced, never swept.
const MEMORY_SWEEP_FLOOR: usize = 1024;

/// Process-local cache for single-node runs without Redis.
pub struct MemoryCache {
    inner: Mutex<MemoryEntries>,
}

struct MemoryEntries {
    expiries: HashMap<String, Instant>,
    sweep_at: usize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryEntries {
                expiries: HashMap::new(),
                sweep_at: MEMORY_SWEEP_FLOOR,
            }),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarkerCache for MemoryCache {
    async fn set_if_absent(
        &self,
        key: &str,
        _value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if inner
            .expiries
            .get(key)
            .is_some_and(|expires_at| *expires_at > now)
        {
            return Ok(false);
        }

        // Sweeps are amortized: the threshold doubles with the live set.
        if inner.expiries.len() >= inner.sweep_at {
            inner.expiries.retain(|_, expires_at| *expires_at > now);
            inner.sweep_at = (inner.expiries.len() * 2).max(MEMORY_SWEEP_FLOOR);
        }
        inner.expiries.insert(key.to_string(), now + ttl);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_sets_once_per_ttl() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_millis(40);

        assert!(cache.set_if_absent("k", "v", ttl).await.unwrap());
        assert!(!cache.set_if_absent("k", "v", ttl).await.unwrap());
        assert!(cache.set_if_absent("other", "v", ttl).await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.set_if_absent("k", "v", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn memory_cache_reclaims_expired_markers() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_millis(20);
        for n in 0..MEMORY_SWEEP_FLOOR {
            assert!(cache.set_if_absent(&format!("k{n}"), "v", ttl).await.unwrap());
        }

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.set_if_absent("fresh", "v", ttl).await.unwrap());

        let inner = cache.inner.lock().unwrap();
        assert_eq!(inner.expiries.len(), 1);
        assert_eq!(inner.sweep_at, MEMORY_SWEEP_FLOOR);
    }
}
