//! Degrading cache client.
//!
//! Every operation runs through the cache's circuit breaker and a command
//! deadline. Backend failures never reach the caller: reads degrade to a
//! miss, writes to `false`, counters to `None`.
//!
//! The `enabled` flag only governs cached data. Rate limit buckets and the
//! store availability probe go to the store regardless.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::codec::Serializer;
use crate::cache::health::CacheHealth;
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::observability::metrics;
use crate::resilience::{with_timeout, CircuitBreaker};
use crate::store::{BucketSpec, KeyValueStore, StoreError, StoreResult, TokenGrant};

/// Breaker name used by [`CacheClient::new`].
pub const CACHE_BREAKER: &str = "cache";

/// Cache facade that fails soft when the store is unavailable.
#[derive(Debug)]
pub struct CacheClient {
    store: Arc<dyn KeyValueStore>,
    breaker: Arc<CircuitBreaker>,
    codec: Serializer,
    enabled: bool,
    default_ttl: Duration,
    command_timeout: Duration,
}

impl CacheClient {
    /// Create a client with its own breaker built from the cache settings.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        config: &CacheConfig,
        command_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(CACHE_BREAKER, &config.breaker(), clock));
        Self::with_breaker(store, config, command_timeout, breaker)
    }

    /// Create a client guarded by an existing breaker.
    pub fn with_breaker(
        store: Arc<dyn KeyValueStore>,
        config: &CacheConfig,
        command_timeout: Duration,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            store,
            breaker,
            codec: Serializer::new(config.serialization_format),
            enabled: config.enabled,
            default_ttl: config.default_ttl(),
            command_timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Join the display forms of `parts` with `:`.
    pub fn generate_key<I>(parts: I) -> String
    where
        I: IntoIterator,
        I::Item: Display,
    {
        parts
            .into_iter()
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Read and decode one value. Missing, undecodable and unreachable all read as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.run("get", || self.store.get(key)).await??;
        self.decode(key, &bytes)
    }

    /// Read several values; the result always has one slot per key.
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Vec<Option<T>> {
        if keys.is_empty() {
            return Vec::new();
        }
        match self.run("mget", || self.store.mget(keys)).await {
            Some(values) if values.len() == keys.len() => values
                .into_iter()
                .zip(keys)
                .map(|(value, key)| value.and_then(|bytes| self.decode(key, &bytes)))
                .collect(),
            Some(values) => {
                tracing::warn!(
                    expected = keys.len(),
                    received = values.len(),
                    "Store returned a mismatched batch, treating as misses"
                );
                misses(keys.len())
            }
            None => misses(keys.len()),
        }
    }

    /// Encode and store a value. `ttl` defaults to the configured TTL; a zero
    /// TTL stores without expiry.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        if !self.enabled {
            return false;
        }
        let bytes = match self.codec.serialize(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "Refusing to cache unencodable value");
                metrics::record_cache_op("set", "error", Duration::ZERO);
                return false;
            }
        };
        let ttl = Some(ttl.unwrap_or(self.default_ttl)).filter(|ttl| !ttl.is_zero());
        self.run("set", || self.store.set(key, bytes, ttl))
            .await
            .is_some()
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.run("delete", || self.store.delete(key))
            .await
            .unwrap_or(false)
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.run("exists", || self.store.exists(key))
            .await
            .unwrap_or(false)
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        self.run("expire", || self.store.expire(key, ttl))
            .await
            .unwrap_or(false)
    }

    /// Add `amount` to a counter. `None` when the store could not be reached.
    pub async fn increment(&self, key: &str, amount: i64) -> Option<i64> {
        self.run("increment", || self.store.incr_by(key, amount)).await
    }

    /// Atomic token bucket step on the shared store.
    ///
    /// Unlike the data operations this runs while caching is disabled and
    /// hands the error back, already logged and counted, so the caller can
    /// tell an open circuit from a failed command.
    pub async fn take_token(&self, key: &str, bucket: BucketSpec, now: f64) -> StoreResult<TokenGrant> {
        self.run_store("take_token", || self.store.take_token(key, bucket, now))
            .await
    }

    /// Whether the cache is enabled and its store is usable right now.
    pub async fn is_available(&self) -> bool {
        self.enabled && self.store_available().await
    }

    /// Whether the store answers, whatever the `enabled` flag says.
    ///
    /// While the circuit is open and the recovery timeout has not elapsed
    /// this answers `false` without touching the store. Afterwards a ping is
    /// sent as the half-open probe; its outcome closes or re-opens the circuit.
    pub async fn store_available(&self) -> bool {
        self.run_store("ping", || self.store.ping()).await.is_ok()
    }

    /// Report status and round-trip latency without affecting the circuit.
    pub async fn health_check(&self) -> CacheHealth {
        if !self.enabled {
            return CacheHealth::disabled();
        }
        if let Some(remaining) = self.breaker.remaining_open_time() {
            return CacheHealth::unhealthy(format!(
                "Circuit breaker open, will reset in {:.1}s",
                remaining.as_secs_f64()
            ));
        }

        if let Err(e) = self.store.connect().await {
            return CacheHealth::unhealthy(format!("Cache health check failed: {e}"));
        }
        let started = tokio::time::Instant::now();
        match with_timeout(self.command_timeout, self.store.ping()).await {
            Ok(()) => CacheHealth::from_latency(started.elapsed()),
            Err(e) => CacheHealth::unhealthy(format!("Cache health check failed: {e}")),
        }
    }

    async fn run<T, F, Fut>(&self, op: &'static str, command: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        if !self.enabled {
            metrics::record_cache_op(op, "skipped", Duration::ZERO);
            return None;
        }
        self.run_store(op, command).await.ok()
    }

    /// One store round trip through the breaker.
    ///
    /// Connecting happens first under the store's connect timeout; only the
    /// command itself is held to `command_timeout`. A failed connect still
    /// counts against the breaker.
    async fn run_store<T, F, Fut>(&self, op: &'static str, command: F) -> StoreResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let started = Instant::now();
        let limit = self.command_timeout;
        let store = &self.store;
        let result = self
            .breaker
            .call(|| async move {
                store.connect().await?;
                with_timeout(limit, command()).await
            })
            .await;

        match &result {
            Ok(_) => metrics::record_cache_op(op, "ok", started.elapsed()),
            Err(StoreError::CircuitOpen(_)) => {
                tracing::debug!(op, "Cache circuit open, skipping store");
                metrics::record_cache_op(op, "skipped", started.elapsed());
            }
            Err(e) => {
                tracing::warn!(op, error = %e, "Cache operation failed, degrading");
                metrics::record_cache_op(op, "error", started.elapsed());
            }
        }
        result
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Option<T> {
        match self.codec.deserialize(bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }
}

fn misses<T>(n: usize) -> Vec<Option<T>> {
    std::iter::repeat_with(|| None).take(n).collect()
}
