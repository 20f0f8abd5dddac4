use std::time::Duration;

use thiserror::Error;

use super::BoxFuture;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
}

/// Keyed numeric counters with atomic increment/decrement. Advisory only:
/// the store row stays authoritative and the cache may be discarded at any
/// time.
pub trait CounterStore: Send + Sync {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<i64>, CacheError>>;
    fn set(&self, key: &str, value: i64) -> BoxFuture<'_, Result<(), CacheError>>;
    fn increment(&self, key: &str, delta: i64) -> BoxFuture<'_, Result<i64, CacheError>>;
    fn decrement(&self, key: &str, delta: i64) -> BoxFuture<'_, Result<i64, CacheError>>;
    fn delete(&self, key: &str) -> BoxFuture<'_, Result<(), CacheError>>;
}

/// Read-through cache of rendered responses. `get` follows one level of
/// `ref:` indirection; deleting an absent key is a no-op.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, CacheError>>;
    fn set(&self, key: &str, value: &str, ttl: Duration) -> BoxFuture<'_, Result<(), CacheError>>;
    /// Stores a pointer to `target` so id-keyed lookups resolve to the one
    /// canonical token-keyed entry.
    fn set_ref(
        &self,
        key: &str,
        target: &str,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<(), CacheError>>;
    fn delete(&self, key: &str) -> BoxFuture<'_, Result<(), CacheError>>;
    /// Removes every key sharing `prefix`; returns how many were dropped.
    fn delete_prefix(&self, prefix: &str) -> BoxFuture<'_, Result<u64, CacheError>>;
}
