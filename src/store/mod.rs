pub mod memory;
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Shared store unavailable: {0}")]
    Unavailable(String),
    #[error("Redis command failed: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Key/value and sorted-set primitives shared by the forecast cache and the
/// rate limiter.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Removes every member of the sorted set whose score is `<= max_score`.
    async fn zrem_range_by_score(&self, key: &str, max_score: f64) -> Result<(), StoreError>;

    async fn zcard(&self, key: &str) -> Result<u64, StoreError>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
