use async_trait::async_trait;
use moka::{future::Cache, Expiry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{SharedStore, StoreError};

#[derive(Clone, Debug)]
struct TimedValue {
    value: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, TimedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &TimedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &TimedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Default)]
struct SortedSet {
    members: HashMap<String, f64>,
    expires_at: Option<Instant>,
}

impl SortedSet {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process stand-in for Redis, used for local runs without a Redis
/// server and as the store double in tests.
pub struct MemoryStore {
    values: Cache<String, TimedValue>,
    sorted_sets: Mutex<HashMap<String, SortedSet>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            values: Cache::builder()
                .max_capacity(10_000)
                .expire_after(PerEntryTtl)
                .build(),
            sorted_sets: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Makes every subsequent command fail as if the server went away.
    #[cfg(test)]
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn with_sets<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, SortedSet>) -> T,
    ) -> Result<T, StoreError> {
        self.ensure_available()?;
        let mut sets = self
            .sorted_sets
            .lock()
            .map_err(|_| StoreError::Unavailable("sorted set lock poisoned".to_string()))?;
        let now = Instant::now();
        sets.retain(|_, set| !set.is_expired(now));
        Ok(f(&mut sets))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_available()?;
        Ok(self.values.get(key).await.map(|entry| entry.value))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.values
            .insert(
                key.to_string(),
                TimedValue {
                    value: value.to_string(),
                    ttl: Duration::from_secs(ttl_secs),
                },
            )
            .await;
        Ok(())
    }

    async fn zrem_range_by_score(&self, key: &str, max_score: f64) -> Result<(), StoreError> {
        self.with_sets(|sets| {
            if let Some(set) = sets.get_mut(key) {
                set.members.retain(|_, score| *score > max_score);
                if set.members.is_empty() {
                    sets.remove(key);
                }
            }
        })
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        self.with_sets(|sets| sets.get(key).map_or(0, |set| set.members.len() as u64))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.with_sets(|sets| {
            sets.entry(key.to_string())
                .or_default()
                .members
                .insert(member.to_string(), score);
        })
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.with_sets(|sets| {
            if let Some(set) = sets.get_mut(key) {
                set.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
            }
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_ex_and_get() {
        let store = MemoryStore::new();
        store.set_ex("weather:moscow:2024-05-01", "[]", 60).await.unwrap();

        let value = store.get("weather:moscow:2024-05-01").await.unwrap();
        assert_eq!(value.as_deref(), Some("[]"));
        assert_eq!(store.get("weather:london:2024-05-01").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_value_expires_after_ttl() {
        let store = MemoryStore::new();
        store.set_ex("short", "v", 0).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sorted_set_prune_is_inclusive() {
        let store = MemoryStore::new();
        store.zadd("rl", "a", 10.0).await.unwrap();
        store.zadd("rl", "b", 20.0).await.unwrap();
        store.zadd("rl", "c", 30.0).await.unwrap();

        store.zrem_range_by_score("rl", 20.0).await.unwrap();
        assert_eq!(store.zcard("rl").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sorted_set_key_expires() {
        let store = MemoryStore::new();
        store.zadd("rl", "a", 1.0).await.unwrap();
        store.expire("rl", 0).await.unwrap();

        assert_eq!(store.zcard("rl").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_loud() {
        let store = MemoryStore::new();
        store.set_available(false);

        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(store.get("k").await.is_err());
        assert!(store.zcard("rl").await.is_err());

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }
}
