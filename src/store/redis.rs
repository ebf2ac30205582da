use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use super::{SharedStore, StoreError};

/// Shared store backed by a single long-lived Redis connection manager.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection_manager = client.get_connection_manager().await?;
        let store = Self { connection_manager };
        store.ping().await?;
        tracing::info!("Connected to shared store at {}", url);
        Ok(store)
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection_manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn zrem_range_by_score(&self, key: &str, max_score: f64) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        let _: () = conn.zrembyscore(key, "-inf", max_score).await?;
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection_manager.clone();
        let count: u64 = conn.zcard(key).await?;
        Ok(count)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        let _: () = conn.expire(key, ttl_secs as i64).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(StoreError::Unavailable(format!(
                "unexpected PING reply: {}",
                pong
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::window_member;

    // These run only when REDIS_URL points at a live server.
    fn redis_url() -> Option<String> {
        std::env::var("REDIS_URL").ok()
    }

    fn unique_key(name: &str) -> String {
        format!("weather_gateway_test_{:016x}:{}", fastrand::u64(..), name)
    }

    #[tokio::test]
    async fn test_set_ex_stores_value_with_ttl() {
        let Some(url) = redis_url() else {
            return;
        };
        let store = RedisStore::connect(&url).await.unwrap();
        let key = unique_key("weather:moscow:2024-05-01");

        store.set_ex(&key, "[]", 120).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("[]"));

        let mut conn = store.connection_manager.clone();
        let ttl: i64 = conn.ttl(&key).await.unwrap();
        assert!((1..=120).contains(&ttl), "ttl = {}", ttl);

        let _: () = conn.del(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sorted_set_prune_is_inclusive() {
        let Some(url) = redis_url() else {
            return;
        };
        let store = RedisStore::connect(&url).await.unwrap();
        let key = unique_key("rate_limit");

        store.zadd(&key, &window_member(10.0), 10.0).await.unwrap();
        store.zadd(&key, &window_member(20.0), 20.0).await.unwrap();
        store.zadd(&key, &window_member(30.0), 30.0).await.unwrap();
        assert_eq!(store.zcard(&key).await.unwrap(), 3);

        store.zrem_range_by_score(&key, 20.0).await.unwrap();
        assert_eq!(store.zcard(&key).await.unwrap(), 1);

        store.expire(&key, 60).await.unwrap();
        let mut conn = store.connection_manager.clone();
        let ttl: i64 = conn.ttl(&key).await.unwrap();
        assert!((1..=60).contains(&ttl), "ttl = {}", ttl);

        let _: () = conn.del(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_timestamp_members_do_not_collapse() {
        let Some(url) = redis_url() else {
            return;
        };
        let store = RedisStore::connect(&url).await.unwrap();
        let key = unique_key("rate_limit");

        store.zadd(&key, &window_member(42.0), 42.0).await.unwrap();
        store.zadd(&key, &window_member(42.0), 42.0).await.unwrap();
        assert_eq!(store.zcard(&key).await.unwrap(), 2);

        let mut conn = store.connection_manager.clone();
        let _: () = conn.del(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_ping() {
        let Some(url) = redis_url() else {
            return;
        };
        let store = RedisStore::connect(&url).await.unwrap();
        store.ping().await.unwrap();
    }
}
