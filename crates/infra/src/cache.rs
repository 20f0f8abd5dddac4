use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use relay_domain::cache_keys::REF_PREFIX;
use relay_domain::ports::BoxFuture;
use relay_domain::ports::cache::{CacheError, CounterStore, ResponseCache};

const SCAN_BATCH: usize = 100;

#[derive(Clone)]
pub struct RedisCounterStore {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisCounterStore {
    pub async fn connect(redis_url: &str, prefix: impl Into<String>) -> Result<Self, CacheError> {
        let manager = connect_manager(redis_url).await?;
        Ok(Self {
            manager,
            prefix: prefix.into(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

impl CounterStore for RedisCounterStore {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<i64>, CacheError>> {
        let key = self.key(key);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let value: Option<i64> = conn
                .get(key)
                .await
                .map_err(|err| CacheError::Operation(err.to_string()))?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: i64) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = self.key(key);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: () = conn
                .set(key, value)
                .await
                .map_err(|err| CacheError::Operation(err.to_string()))?;
            Ok(())
        })
    }

    fn increment(&self, key: &str, delta: i64) -> BoxFuture<'_, Result<i64, CacheError>> {
        let key = self.key(key);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let value: i64 = conn
                .incr(key, delta)
                .await
                .map_err(|err| CacheError::Operation(err.to_string()))?;
            Ok(value)
        })
    }

    fn decrement(&self, key: &str, delta: i64) -> BoxFuture<'_, Result<i64, CacheError>> {
        let key = self.key(key);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let value: i64 = redis::cmd("DECRBY")
                .arg(&key)
                .arg(delta)
                .query_async(&mut conn)
                .await
                .map_err(|err| CacheError::Operation(err.to_string()))?;
            Ok(value)
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = self.key(key);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: i64 = conn
                .del(key)
                .await
                .map_err(|err| CacheError::Operation(err.to_string()))?;
            Ok(())
        })
    }
}

#[derive(Clone)]
pub struct RedisResponseCache {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisResponseCache {
    pub async fn connect(redis_url: &str, prefix: impl Into<String>) -> Result<Self, CacheError> {
        let manager = connect_manager(redis_url).await?;
        Ok(Self {
            manager,
            prefix: prefix.into(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }

    fn ttl_ms(ttl: Duration) -> u64 {
        let ms = ttl.as_millis() as u64;
        if ms == 0 { 1 } else { ms }
    }
}

impl ResponseCache for RedisResponseCache {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, CacheError>> {
        let is_ref = key.starts_with(REF_PREFIX);
        let key = self.key(key);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let value: Option<String> = conn
                .get(&key)
                .await
                .map_err(|err| CacheError::Operation(err.to_string()))?;
            match value {
                Some(target) if is_ref => {
                    let target = self.key(&target);
                    let value: Option<String> = conn
                        .get(target)
                        .await
                        .map_err(|err| CacheError::Operation(err.to_string()))?;
                    Ok(value)
                }
                other => Ok(other),
            }
        })
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = self.key(key);
        let value = value.to_string();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: () = redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("PX")
                .arg(Self::ttl_ms(ttl))
                .query_async(&mut conn)
                .await
                .map_err(|err| CacheError::Operation(err.to_string()))?;
            Ok(())
        })
    }

    fn set_ref(
        &self,
        key: &str,
        target: &str,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<(), CacheError>> {
        // the unprefixed target name is stored so reads can re-prefix it
        self.set(key, target, ttl)
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = self.key(key);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: i64 = conn
                .del(key)
                .await
                .map_err(|err| CacheError::Operation(err.to_string()))?;
            Ok(())
        })
    }

    fn delete_prefix(&self, prefix: &str) -> BoxFuture<'_, Result<u64, CacheError>> {
        let pattern = format!("{}*", self.key(prefix));
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let mut cursor: u64 = 0;
            let mut removed: u64 = 0;
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn)
                    .await
                    .map_err(|err| CacheError::Operation(err.to_string()))?;
                if !keys.is_empty() {
                    let dropped: i64 = redis::cmd("DEL")
                        .arg(&keys)
                        .query_async(&mut conn)
                        .await
                        .map_err(|err| CacheError::Operation(err.to_string()))?;
                    removed += dropped as u64;
                }
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            Ok(removed)
        })
    }
}

async fn connect_manager(redis_url: &str) -> Result<ConnectionManager, CacheError> {
    let client =
        redis::Client::open(redis_url).map_err(|err| CacheError::Unavailable(err.to_string()))?;
    ConnectionManager::new(client)
        .await
        .map_err(|err| CacheError::Unavailable(err.to_string()))
}

#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    counters: Arc<Mutex<HashMap<String, i64>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounterStore {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<i64>, CacheError>> {
        let key = key.to_string();
        let counters = self.counters.clone();
        Box::pin(async move { Ok(counters.lock().unwrap().get(&key).copied()) })
    }

    fn set(&self, key: &str, value: i64) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = key.to_string();
        let counters = self.counters.clone();
        Box::pin(async move {
            counters.lock().unwrap().insert(key, value);
            Ok(())
        })
    }

    fn increment(&self, key: &str, delta: i64) -> BoxFuture<'_, Result<i64, CacheError>> {
        let key = key.to_string();
        let counters = self.counters.clone();
        Box::pin(async move {
            let mut counters = counters.lock().unwrap();
            let value = counters.entry(key).or_insert(0);
            *value += delta;
            Ok(*value)
        })
    }

    fn decrement(&self, key: &str, delta: i64) -> BoxFuture<'_, Result<i64, CacheError>> {
        let key = key.to_string();
        let counters = self.counters.clone();
        Box::pin(async move {
            let mut counters = counters.lock().unwrap();
            let value = counters.entry(key).or_insert(0);
            *value -= delta;
            Ok(*value)
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = key.to_string();
        let counters = self.counters.clone();
        Box::pin(async move {
            counters.lock().unwrap().remove(&key);
            Ok(())
        })
    }
}

#[derive(Clone, Debug)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Clone, Default)]
pub struct MemoryResponseCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn fetch(entries: &HashMap<String, CacheEntry>, key: &str) -> Option<String> {
        entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }
}

impl ResponseCache for MemoryResponseCache {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, CacheError>> {
        let key = key.to_string();
        let entries = self.entries.clone();
        Box::pin(async move {
            let entries = entries.lock().unwrap();
            let value = Self::fetch(&entries, &key);
            if key.starts_with(REF_PREFIX) {
                return Ok(value.and_then(|target| Self::fetch(&entries, &target)));
            }
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = key.to_string();
        let value = value.to_string();
        let entries = self.entries.clone();
        Box::pin(async move {
            entries.lock().unwrap().insert(
                key,
                CacheEntry {
                    value,
                    expires_at: Instant::now() + ttl,
                },
            );
            Ok(())
        })
    }

    fn set_ref(
        &self,
        key: &str,
        target: &str,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<(), CacheError>> {
        self.set(key, target, ttl)
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = key.to_string();
        let entries = self.entries.clone();
        Box::pin(async move {
            entries.lock().unwrap().remove(&key);
            Ok(())
        })
    }

    fn delete_prefix(&self, prefix: &str) -> BoxFuture<'_, Result<u64, CacheError>> {
        let prefix = prefix.to_string();
        let entries = self.entries.clone();
        Box::pin(async move {
            let mut entries = entries.lock().unwrap();
            let before = entries.len();
            entries.retain(|key, _| !key.starts_with(&prefix));
            Ok((before - entries.len()) as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn response_cache_round_trip_and_prefix_delete() {
        let cache = MemoryResponseCache::new();
        cache.set("applications:page:1:limit:10", "a", TTL).await.unwrap();
        cache.set("applications:page:2:limit:10", "b", TTL).await.unwrap();
        cache.set("application:token:t:summary", "c", TTL).await.unwrap();

        assert_eq!(
            cache.get("applications:page:1:limit:10").await.unwrap(),
            Some("a".to_string())
        );
        let removed = cache.delete_prefix("applications:page:").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.get("applications:page:1:limit:10").await.unwrap(), None);
        assert_eq!(
            cache.get("application:token:t:summary").await.unwrap(),
            Some("c".to_string())
        );
    }

    #[tokio::test]
    async fn ref_keys_follow_indirection_to_the_canonical_entry() {
        let cache = MemoryResponseCache::new();
        cache
            .set("application:token:tok:summary", "payload", TTL)
            .await
            .unwrap();
        cache
            .set_ref("ref:application:id:7:summary", "application:token:tok:summary", TTL)
            .await
            .unwrap();

        assert_eq!(
            cache.get("ref:application:id:7:summary").await.unwrap(),
            Some("payload".to_string())
        );

        // dropping the canonical entry makes the ref a miss, not an error
        cache.delete("application:token:tok:summary").await.unwrap();
        assert_eq!(cache.get("ref:application:id:7:summary").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let cache = MemoryResponseCache::new();
        cache.set("k", "v", Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn deleting_an_absent_key_is_a_noop() {
        let cache = MemoryResponseCache::new();
        cache.delete("missing").await.expect("no-op");
        assert_eq!(cache.delete_prefix("missing:").await.unwrap(), 0);

        let counters = MemoryCounterStore::new();
        counters.delete("missing").await.expect("no-op");
    }

    #[tokio::test]
    async fn counters_increment_and_decrement_atomically() {
        let counters = MemoryCounterStore::new();
        assert_eq!(counters.get("k").await.unwrap(), None);
        assert_eq!(counters.increment("k", 3).await.unwrap(), 3);
        assert_eq!(counters.decrement("k", 1).await.unwrap(), 2);
        counters.set("k", 10).await.unwrap();
        assert_eq!(counters.get("k").await.unwrap(), Some(10));
    }
}
