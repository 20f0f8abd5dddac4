//! Best-effort wrappers around the cache ports. Cache trouble must never
//! fail a request: every error here is logged and swallowed, and readers
//! fall back to the store.

use std::time::Duration;

use serde_json::Value;

use crate::ports::cache::{CounterStore, ResponseCache};

pub(crate) async fn get(cache: &dyn ResponseCache, key: &str) -> Option<Value> {
    match cache.get(key).await {
        Ok(Some(payload)) => match serde_json::from_str(&payload) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(error = %err, key, "dropping undecodable cache entry");
                let _ = cache.delete(key).await;
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(error = %err, key, "response cache read failed");
            None
        }
    }
}

pub(crate) async fn put(cache: &dyn ResponseCache, key: &str, value: &Value, ttl: Duration) {
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(error = %err, key, "failed to serialize cache entry");
            return;
        }
    };
    if let Err(err) = cache.set(key, &payload, ttl).await {
        tracing::warn!(error = %err, key, "response cache write failed");
    }
}

pub(crate) async fn put_ref(cache: &dyn ResponseCache, key: &str, target: &str, ttl: Duration) {
    if let Err(err) = cache.set_ref(key, target, ttl).await {
        tracing::warn!(error = %err, key, target, "response cache ref write failed");
    }
}

pub(crate) async fn delete(cache: &dyn ResponseCache, key: &str) {
    if let Err(err) = cache.delete(key).await {
        tracing::warn!(error = %err, key, "response cache delete failed");
    }
}

pub(crate) async fn delete_prefix(cache: &dyn ResponseCache, prefix: &str) {
    if let Err(err) = cache.delete_prefix(prefix).await {
        tracing::warn!(error = %err, prefix, "response cache prefix delete failed");
    }
}

pub(crate) async fn counter_set(counters: &dyn CounterStore, key: &str, value: i64) {
    if let Err(err) = counters.set(key, value).await {
        tracing::warn!(error = %err, key, "counter cache write failed");
    }
}

pub(crate) async fn counter_delete(counters: &dyn CounterStore, key: &str) {
    if let Err(err) = counters.delete(key).await {
        tracing::warn!(error = %err, key, "counter cache delete failed");
    }
}
