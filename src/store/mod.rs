//! Shared key-value store subsystem.
//!
//! # Data Flow
//! ```text
//! CacheClient / RateLimiter
//!     → KeyValueStore (trait object chosen at startup)
//!         → redis.rs  (networked, shared across processes)
//!         → memory.rs (process-local, fault-injectable)
//! ```
//!
//! # Design Decisions
//! - Stores speak raw bytes; encoding belongs to the cache codec
//! - Token bucket evaluation is a single store primitive so that the
//!   read-refill-consume-write sequence is atomic per key
//! - Stores apply no deadlines or circuit logic of their own beyond
//!   connection establishment; callers wrap every round trip

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::config::{StoreBackend, StoreConfig};

pub mod memory;
pub mod redis;
pub mod types;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;
pub use types::{BucketSpec, BucketState, StoreError, StoreResult, TokenGrant};

/// Operations the guard needs from a shared key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync + Debug {
    /// Establish the backend connection if there is none yet.
    ///
    /// Bounded by the store's own connect timeout, not by the per-command
    /// deadline callers put around the commands below.
    async fn connect(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// One entry per key, in key order.
    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>>;

    /// Store a value, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Returns whether the key existed.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Add `amount` to an integer counter, creating it at zero.
    async fn incr_by(&self, key: &str, amount: i64) -> StoreResult<i64>;

    async fn ping(&self) -> StoreResult<()>;

    /// Atomically refill the bucket at `key` to `now` (epoch seconds) and try
    /// to consume one token. The key's expiry is reset to `bucket.ttl()`.
    async fn take_token(&self, key: &str, bucket: BucketSpec, now: f64) -> StoreResult<TokenGrant>;
}

/// Build the configured store. Redis connections are established lazily.
pub fn build_store(config: &StoreConfig, clock: Arc<dyn Clock>) -> StoreResult<Arc<dyn KeyValueStore>> {
    match config.backend {
        StoreBackend::Redis => Ok(Arc::new(RedisStore::new(config)?)),
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new(clock))),
    }
}
