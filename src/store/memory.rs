//! Process-local store.
//!
//! Backs single-instance deployments and tests. Expiry is evaluated lazily
//! against the injected clock. Availability, latency and one-shot failures
//! can be injected to exercise degradation paths.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::clock::Clock;
use crate::store::types::{BucketSpec, BucketState, StoreError, StoreResult, TokenGrant};
use crate::store::KeyValueStore;

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Bucket(BucketState),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Duration>,
}

impl Entry {
    fn is_expired(&self, now: Duration) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`KeyValueStore`] over a sharded concurrent map.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
    latency_ms: AtomicU64,
    failures_pending: AtomicU32,
    calls: AtomicU64,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            failures_pending: AtomicU32::new(0),
            calls: AtomicU64::new(0),
        }
    }

    /// Make every subsequent command fail with a connection error, or recover.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every command by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail the next `n` commands with a backend error.
    pub fn fail_next(&self, n: u32) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    /// Commands received so far, including failed ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn enter(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("memory store marked unavailable".into()));
        }
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Backend("injected failure".into()));
        }
        Ok(())
    }

    /// Current value of a live key, dropping it if it has expired.
    fn live(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        None
    }

    fn bytes(key: &str, value: Value) -> StoreResult<Vec<u8>> {
        match value {
            Value::Bytes(bytes) => Ok(bytes),
            Value::Bucket(_) => Err(wrong_type(key)),
        }
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Backend(format!("WRONGTYPE key '{key}' holds the wrong kind of value"))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.enter().await?;
        self.live(key).map(|v| Self::bytes(key, v)).transpose()
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.enter().await?;
        // Like MGET, a key of another type reads as missing.
        Ok(keys
            .iter()
            .map(|key| match self.live(key) {
                Some(Value::Bytes(bytes)) => Some(bytes),
                _ => None,
            })
            .collect())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        self.enter().await?;
        let expires_at = ttl.map(|ttl| self.clock.now() + ttl);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.enter().await?;
        let live = self.live(key).is_some();
        self.entries.remove(key);
        Ok(live)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.enter().await?;
        Ok(self.live(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.enter().await?;
        let now = self.clock.now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn incr_by(&self, key: &str, amount: i64) -> StoreResult<i64> {
        self.enter().await?;
        let now = self.clock.now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Bytes(b"0".to_vec()),
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = Entry {
                value: Value::Bytes(b"0".to_vec()),
                expires_at: None,
            };
        }

        let current = match &entry.value {
            Value::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| StoreError::Backend("value is not an integer".into()))?,
            Value::Bucket(_) => return Err(wrong_type(key)),
        };
        let next = current
            .checked_add(amount)
            .ok_or_else(|| StoreError::Backend("increment would overflow".into()))?;
        entry.value = Value::Bytes(next.to_string().into_bytes());
        Ok(next)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.enter().await
    }

    async fn take_token(&self, key: &str, bucket: BucketSpec, now: f64) -> StoreResult<TokenGrant> {
        self.enter().await?;
        let clock_now = self.clock.now();

        // The entry guard holds the shard lock for the whole evaluation.
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Bucket(BucketState::full(bucket, now)),
            expires_at: None,
        });
        if entry.is_expired(clock_now) {
            entry.value = Value::Bucket(BucketState::full(bucket, now));
        }

        let grant = match &mut entry.value {
            Value::Bucket(state) => state.take(bucket, now),
            Value::Bytes(_) => return Err(wrong_type(key)),
        };
        entry.expires_at = Some(clock_now + bucket.ttl());
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::new(Duration::from_secs(1_000)));
        let store = MemoryStore::new(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn test_values_expire_with_the_clock() {
        let (clock, store) = store();
        store
            .set("k", b"v".to_vec(), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        clock.advance(Duration::from_secs(10));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_mget_preserves_order_and_gaps() {
        let (_, store) = store();
        store.set("a", b"1".to_vec(), None).await.unwrap();
        store.set("c", b"3".to_vec(), None).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values = store.mget(&keys).await.unwrap();
        assert_eq!(values, vec![Some(b"1".to_vec()), None, Some(b"3".to_vec())]);
    }

    #[tokio::test]
    async fn test_incr_and_expire() {
        let (clock, store) = store();
        assert_eq!(store.incr_by("n", 5).await.unwrap(), 5);
        assert_eq!(store.incr_by("n", -2).await.unwrap(), 3);
        assert!(store.expire("n", Duration::from_secs(1)).await.unwrap());
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());

        clock.advance(Duration::from_secs(2));
        assert!(!store.exists("n").await.unwrap());
        assert_eq!(store.incr_by("n", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let (_, store) = store();
        store.set("s", b"hello".to_vec(), None).await.unwrap();
        assert!(matches!(store.incr_by("s", 1).await, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn test_take_token_sets_bucket_expiry() {
        let (clock, store) = store();
        let spec = BucketSpec::new(2, Duration::from_secs(10));
        let now = clock.now_secs_f64();

        assert!(store.take_token("b", spec, now).await.unwrap().allowed);
        assert!(store.take_token("b", spec, now).await.unwrap().allowed);
        assert!(!store.take_token("b", spec, now).await.unwrap().allowed);

        // Idle past twice the window: the key is gone and the bucket is full.
        clock.advance(Duration::from_secs(20));
        assert!(!store.exists("b").await.unwrap());
        let grant = store
            .take_token("b", spec, clock.now_secs_f64())
            .await
            .unwrap();
        assert!(grant.allowed);
        assert_eq!(grant.tokens, 1.0);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let (_, store) = store();
        store.fail_next(1);
        assert!(matches!(store.ping().await, Err(StoreError::Backend(_))));
        assert!(store.ping().await.is_ok());

        store.set_available(false);
        assert!(matches!(store.get("k").await, Err(StoreError::Connection(_))));
        store.set_available(true);
        assert!(store.get("k").await.unwrap().is_none());
        assert_eq!(store.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_latency() {
        let (_, store) = store();
        store.set_latency(Duration::from_millis(150));
        let started = tokio::time::Instant::now();
        store.ping().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}
