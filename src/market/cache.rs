use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::logging::agg_increment;

#[derive(Debug, Clone)]
struct CachedEntry {
    value: Value,
    expires_at: Instant,
}

impl CachedEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Response cache with per-entry expiry. Expired entries are dropped on read.
#[derive(Debug, Default)]
pub struct ApiCache {
    entries: Mutex<HashMap<String, CachedEntry>>,
}

impl ApiCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => {
                agg_increment("cache_hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                agg_increment("cache_miss");
                None
            }
            None => {
                agg_increment("cache_miss");
                None
            }
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let entry = CachedEntry { value, expires_at: Instant::now() + ttl };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.into(), entry);
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Entry count, expired ones included until they are read or purged.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| e.is_fresh(now));
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn returns_fresh_entries() {
        let cache = ApiCache::new();
        cache.set("quote_{\"symbol\":\"VWCE\"}", json!({"latestPrice": 108.45}), Duration::from_secs(60));
        assert_eq!(cache.get("quote_{\"symbol\":\"VWCE\"}").unwrap()["latestPrice"], 108.45);
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let cache = ApiCache::new();
        cache.set("k", json!(1), Duration::from_millis(0));
        assert_eq!(cache.len(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn purge_delete_clear() {
        let cache = ApiCache::new();
        cache.set("a", json!(1), Duration::from_millis(0));
        cache.set("b", json!(2), Duration::from_secs(60));
        cache.set("c", json!(3), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.delete("b"));
        assert!(!cache.delete("b"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
