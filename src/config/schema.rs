//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::FailureKind;

/// Root configuration for the admission guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Shared key-value store connection.
    pub store: StoreConfig,

    /// Response/counter cache settings.
    pub cache: CacheConfig,

    /// Distributed rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Circuit breakers by protected resource name.
    pub breakers: HashMap<String, BreakerConfig>,

    /// Upstream service guarded by the binary.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Which store implementation backs the cache and the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    /// Process-local store; buckets are not shared between processes.
    Memory,
}

/// Shared store connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Connection URL (e.g., "redis://localhost:6379/0").
    pub url: String,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Per-command timeout in milliseconds.
    pub command_timeout_ms: u64,
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            url: "redis://localhost:6379/0".to_string(),
            connect_timeout_ms: 500,
            command_timeout_ms: 250,
        }
    }
}

/// Value encoding used by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    #[default]
    Json,
    #[serde(alias = "msgpack")]
    MessagePack,
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Disabled caches behave as permanently empty.
    pub enabled: bool,

    /// TTL applied by `set` when none is given, in seconds.
    pub default_ttl_secs: u64,

    pub serialization_format: SerializationFormat,

    /// Consecutive backend failures before the cache stops calling the store.
    pub failure_threshold: u32,

    /// Seconds the cache circuit stays open before a recovery probe.
    pub circuit_reset_secs: u64,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Breaker settings for the cache's own circuit.
    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout_secs: self.circuit_reset_secs,
            exception_whitelist: vec![FailureKind::Serialization],
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 60,
            serialization_format: SerializationFormat::Json,
            failure_threshold: 5,
            circuit_reset_secs: 30,
        }
    }
}

/// A token bucket's size and refill window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LimitConfig {
    /// Bucket capacity (requests per window).
    pub limit: u32,

    /// Seconds to refill an empty bucket.
    pub window_secs: u64,
}

impl LimitConfig {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    pub anonymous: LimitConfig,

    pub authenticated: LimitConfig,

    pub sensitive: LimitConfig,

    /// Path prefixes subject to limiting; other paths bypass the limiter.
    pub protected_paths: Vec<String>,

    /// Path prefixes using the sensitive limit regardless of authentication.
    pub sensitive_paths: Vec<String>,

    /// Credential headers in lookup order.
    pub credential_headers: Vec<String>,

    /// Minimum seconds between store availability probes.
    pub availability_check_cooldown_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            anonymous: LimitConfig::new(20, 60),
            authenticated: LimitConfig::new(100, 60),
            sensitive: LimitConfig::new(10, 60),
            protected_paths: vec![
                "/api/v1/predict".to_string(),
                "/api/v1/batch-predict".to_string(),
            ],
            sensitive_paths: Vec::new(),
            credential_headers: vec![
                "X-API-Key".to_string(),
                "Authorization".to_string(),
                "X-Auth-Token".to_string(),
            ],
            availability_check_cooldown_secs: 5,
        }
    }
}

/// Circuit breaker configuration for one protected resource.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds an open circuit waits before admitting a probe.
    pub recovery_timeout_secs: u64,

    /// Failure kinds that never count against the breaker.
    pub exception_whitelist: Vec<FailureKind>,
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            exception_whitelist: Vec::new(),
        }
    }
}

/// Retry policy with exponential backoff.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first; 1 disables retries.
    pub max_attempts: u32,

    /// Delay before the first retry, doubled for each later one.
    pub base_delay_ms: u64,

    /// Upper bound on a single delay before jitter.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

/// Upstream service the binary forwards guarded requests to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL requests are forwarded to.
    pub base_url: String,

    pub timeout_secs: u64,

    /// TTL for cached upstream GET responses; 0 disables response caching.
    pub cache_ttl_secs: u64,

    /// Name of the breaker protecting upstream calls.
    pub breaker: String,

    /// Retries around the breaker for transient upstream failures.
    pub retry: RetryConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            timeout_secs: 10,
            cache_ttl_secs: 60,
            breaker: "upstream".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

/// Placeholder admin key; validation rejects it when the admin API is enabled.
pub const ADMIN_KEY_PLACEHOLDER: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: ADMIN_KEY_PLACEHOLDER.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
