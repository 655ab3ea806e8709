//! Redis-backed store.
//!
//! The connection is established on first use and then shared through a
//! cloned `ConnectionManager`, which reconnects on its own after drops.
//! Bucket evaluation runs as a server-side Lua script so concurrent
//! instances cannot interleave read and write.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};

use crate::config::StoreConfig;
use crate::resilience::with_timeout;
use crate::store::types::{BucketSpec, StoreError, StoreResult, TokenGrant};
use crate::store::KeyValueStore;

/// Refill and take one token. Returns `{allowed, tokens}` with tokens as a
/// string so fractions survive the integer reply conversion.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local state = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(state[1])
local last_refill = tonumber(state[2])
if tokens == nil then tokens = capacity end
if last_refill == nil then last_refill = now end

local elapsed = math.max(0, now - last_refill)
tokens = math.min(capacity, tokens + elapsed * capacity / window)

local allowed = 0
if tokens >= 1 then
    allowed = 1
    tokens = tokens - 1
    redis.call('HSET', key, 'tokens', string.format('%.17g', tokens), 'last_refill', ARGV[3])
end
redis.call('EXPIRE', key, ttl)

return {allowed, string.format('%.17g', tokens)}
"#;

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
        {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

/// [`KeyValueStore`] over a Redis server.
pub struct RedisStore {
    client: Client,
    connection: RwLock<Option<ConnectionManager>>,
    connect_timeout: Duration,
    bucket_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection_info", self.client.get_connection_info())
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Parse the URL without connecting.
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::Connection(format!("invalid store url: {e}")))?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
            connect_timeout: config.connect_timeout(),
            bucket_script: Script::new(TOKEN_BUCKET_SCRIPT),
        })
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        let cached = self
            .connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }

        let client = self.client.clone();
        let manager = with_timeout(self.connect_timeout, async move {
            ConnectionManager::new(client).await.map_err(StoreError::from)
        })
        .await?;
        tracing::info!(
            addr = ?self.client.get_connection_info().addr,
            "Connected to shared store"
        );

        let mut slot = self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(slot.get_or_insert(manager).clone())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn connect(&self) -> StoreResult<()> {
        self.connection().await.map(|_| ())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
        Ok(values)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let count: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(count > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(updated == 1)
    }

    async fn incr_by(&self, key: &str, amount: i64) -> StoreResult<i64> {
        let mut conn = self.connection().await?;
        let value: i64 = redis::cmd("INCRBY").arg(key).arg(amount).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn take_token(&self, key: &str, bucket: BucketSpec, now: f64) -> StoreResult<TokenGrant> {
        let mut conn = self.connection().await?;
        let (allowed, tokens): (i64, String) = self
            .bucket_script
            .key(key)
            .arg(bucket.capacity)
            .arg(bucket.window.as_secs_f64())
            .arg(now)
            .arg(bucket.ttl().as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;
        let tokens = tokens
            .parse::<f64>()
            .map_err(|e| StoreError::Backend(format!("malformed bucket reply '{tokens}': {e}")))?;
        Ok(TokenGrant {
            allowed: allowed == 1,
            tokens,
        })
    }
}
