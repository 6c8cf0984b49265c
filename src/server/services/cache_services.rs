use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use redis::AsyncCommands;
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::database::RedisDatabase;

/// search results
pub const SEARCH_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// detail / view count lookups and resolved episode lists
pub const DETAIL_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

const CACHE_PREFIX: &str = "dramabox-cache";

pub fn cache_key(kind: &str, identifier: &str) -> String {
    format!("{}:{}:{}", CACHE_PREFIX, kind, identifier)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub value: String,
    /// remaining lifetime, carried over when an entry is promoted between tiers
    pub expires_in: Duration,
}

pub type DynCacheStore = Arc<dyn CacheStoreTrait + Send + Sync>;

/// one tier. implementations must treat anything past its TTL as absent
#[automock]
#[async_trait]
pub trait CacheStoreTrait {
    async fn get(&self, key: &str) -> Option<CacheHit>;
    async fn set(&self, key: &str, value: &str, ttl: Duration);
    async fn has(&self, key: &str) -> bool;
    async fn remove(&self, key: &str);
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// process lifetime map. uses the tokio clock so paused-time tests can step over a TTL
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStoreTrait for MemoryCacheStore {
    async fn get(&self, key: &str) -> Option<CacheHit> {
        let mut lock = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        match lock.get(key) {
            Some(entry) if entry.expires_at > now => Some(CacheHit {
                value: entry.value.clone(),
                expires_in: entry.expires_at - now,
            }),
            Some(_) => {
                // stale, evict on read
                lock.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut lock = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        lock.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    async fn remove(&self, key: &str) {
        let mut lock = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        lock.remove(key);
    }
}

/// persisted tier. redis does the expiry itself, keys are hashed so arbitrary keywords are safe
pub struct RedisCacheStore {
    redis: Arc<RedisDatabase>,
}

impl RedisCacheStore {
    pub fn new(redis: Arc<RedisDatabase>) -> Self {
        Self { redis }
    }

    fn redis_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("dcache:{}", hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl CacheStoreTrait for RedisCacheStore {
    async fn get(&self, key: &str) -> Option<CacheHit> {
        let redis_key = Self::redis_key(key);
        let mut conn = self.redis.connection.clone();

        // value and remaining ttl in one round trip
        let result: Result<(Option<String>, i64), redis::RedisError> = redis::pipe()
            .get(&redis_key)
            .pttl(&redis_key)
            .query_async(&mut conn)
            .await;

        match result {
            Ok((Some(value), pttl)) if pttl > 0 => Some(CacheHit {
                value,
                expires_in: Duration::from_millis(pttl as u64),
            }),
            Ok(_) => None,
            Err(e) => {
                error!("persisted cache GET failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let redis_key = Self::redis_key(key);
        let mut conn = self.redis.connection.clone();

        let result: Result<(), redis::RedisError> =
            conn.set_ex(&redis_key, value, ttl.as_secs().max(1)).await;

        if let Err(e) = result {
            error!("persisted cache SET failed for {}: {}", key, e);
        }
    }

    async fn has(&self, key: &str) -> bool {
        let mut conn = self.redis.connection.clone();
        let result: Result<bool, redis::RedisError> = conn.exists(Self::redis_key(key)).await;

        result.unwrap_or_else(|e| {
            error!("persisted cache EXISTS failed for {}: {}", key, e);
            false
        })
    }

    async fn remove(&self, key: &str) {
        let mut conn = self.redis.connection.clone();
        let result: Result<i32, redis::RedisError> = conn.del(Self::redis_key(key)).await;

        if let Err(e) = result {
            error!("persisted cache DEL failed for {}: {}", key, e);
        }
    }
}

pub type DynCacheService = Arc<CacheService>;

/// the memoization layer handed to the aggregator and resolver. reads go in-process first,
/// then the persisted tier (promoting hits), writes go to both. no locking across the
/// read-check-write, a race just means one duplicate upstream call writing the same value
pub struct CacheService {
    memory: MemoryCacheStore,
    persisted: Option<DynCacheStore>,
}

impl CacheService {
    pub fn new(persisted: Option<DynCacheStore>) -> Self {
        Self {
            memory: MemoryCacheStore::new(),
            persisted,
        }
    }

    pub fn memory_only() -> Self {
        Self::new(None)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(hit) = self.memory.get(key).await {
            match serde_json::from_str(&hit.value) {
                Ok(value) => {
                    record_lookup("memory", "hit");
                    debug!("memory cache HIT for {}", key);
                    return Some(value);
                }
                Err(e) => {
                    warn!("dropping unreadable memory cache entry {}: {}", key, e);
                    self.memory.remove(key).await;
                }
            }
        }
        record_lookup("memory", "miss");

        let persisted = self.persisted.as_ref()?;
        let Some(hit) = persisted.get(key).await else {
            record_lookup("persisted", "miss");
            return None;
        };

        match serde_json::from_str(&hit.value) {
            Ok(value) => {
                record_lookup("persisted", "hit");
                debug!("persisted cache HIT for {}", key);
                self.memory.set(key, &hit.value, hit.expires_in).await;
                Some(value)
            }
            Err(e) => {
                warn!("dropping unreadable persisted cache entry {}: {}", key, e);
                persisted.remove(key).await;
                None
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("failed to encode cache entry {}: {}", key, e);
                return;
            }
        };

        self.memory.set(key, &encoded, ttl).await;
        if let Some(persisted) = &self.persisted {
            persisted.set(key, &encoded, ttl).await;
        }
    }
}

fn record_lookup(tier: &'static str, outcome: &'static str) {
    metrics::counter!("dramabox_cache_lookups_total", "tier" => tier, "outcome" => outcome)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn memory_entry_expires_after_ttl() {
        let store = MemoryCacheStore::new();
        store.set("k", "v", Duration::from_secs(10)).await;

        assert!(store.has("k").await);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.get("k").await.is_none());
        assert!(store.entries.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_hit_is_promoted_with_remaining_ttl() {
        let mut persisted = MockCacheStoreTrait::new();
        persisted.expect_get().times(1).returning(|_| {
            Some(CacheHit {
                value: "[1,2,3]".to_string(),
                expires_in: Duration::from_secs(30),
            })
        });

        let cache = CacheService::new(Some(Arc::new(persisted)));

        let first: Option<Vec<i32>> = cache.get_json("nums").await;
        let second: Option<Vec<i32>> = cache.get_json("nums").await;
        assert_eq!(first, Some(vec![1, 2, 3]));
        assert_eq!(second, Some(vec![1, 2, 3]));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!cache.memory.has("nums").await);
    }
}
