//! Distributed token bucket rate limiter.

use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::http::HeaderMap;
use serde::Serialize;

use crate::cache::CacheClient;
use crate::clock::Clock;
use crate::config::{LimitConfig, RateLimitConfig};
use crate::observability::metrics;
use crate::ratelimit::identity::ClientIdentity;
use crate::store::{BucketSpec, StoreError, TokenGrant};

/// Which limit applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    Anonymous,
    Authenticated,
    Sensitive,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Anonymous => "anonymous",
            EndpointClass::Authenticated => "authenticated",
            EndpointClass::Sensitive => "sensitive",
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub class: EndpointClass,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds at which the bucket is full again.
    pub reset_at: u64,
    /// Set on denials: time until one token is available.
    pub retry_after: Option<Duration>,
    /// The store could not decide and the request was let through.
    pub fail_open: bool,
}

impl RateLimitDecision {
    fn from_grant(class: EndpointClass, limit: LimitConfig, grant: TokenGrant, now: f64) -> Self {
        let capacity = f64::from(limit.limit);
        let window = limit.window_secs as f64;
        let tokens = grant.tokens.clamp(0.0, capacity);
        let reset_at = (now + (capacity - tokens) * window / capacity).ceil() as u64;

        if grant.allowed {
            Self {
                allowed: true,
                class,
                limit: limit.limit,
                remaining: (tokens.floor() as u32).min(limit.limit),
                reset_at,
                retry_after: None,
                fail_open: false,
            }
        } else {
            let wait = ((1.0 - tokens) * window / capacity).max(0.0);
            Self {
                allowed: false,
                class,
                limit: limit.limit,
                remaining: 0,
                reset_at,
                retry_after: Some(Duration::from_secs_f64(wait)),
                fail_open: false,
            }
        }
    }

    fn fail_open(class: EndpointClass, limit: LimitConfig, now: f64) -> Self {
        Self {
            allowed: true,
            class,
            limit: limit.limit,
            remaining: limit.limit,
            reset_at: now.ceil() as u64,
            retry_after: None,
            fail_open: true,
        }
    }

    /// Retry-After in whole seconds, at least one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after
            .map(|wait| (wait.as_secs_f64().ceil() as u64).max(1))
    }
}

#[derive(Debug)]
struct AvailabilityProbe {
    last_check: Option<Duration>,
    available: bool,
}

/// Token bucket limiter whose buckets live in the shared store.
#[derive(Debug)]
pub struct RateLimiter {
    cache: Arc<CacheClient>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    probe: Mutex<AvailabilityProbe>,
}

impl RateLimiter {
    pub fn new(cache: Arc<CacheClient>, config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            config,
            clock,
            probe: Mutex::new(AvailabilityProbe {
                last_check: None,
                available: true,
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Limit configuration for a class.
    pub fn limit_for(&self, class: EndpointClass) -> LimitConfig {
        match class {
            EndpointClass::Anonymous => self.config.anonymous,
            EndpointClass::Authenticated => self.config.authenticated,
            EndpointClass::Sensitive => self.config.sensitive,
        }
    }

    /// Which class applies to `path`, or `None` when the path is not limited.
    pub fn classify(&self, path: &str, authenticated: bool) -> Option<EndpointClass> {
        if !self.config.enabled {
            return None;
        }
        let matches = |prefixes: &[String]| prefixes.iter().any(|p| path.starts_with(p.as_str()));

        if matches(&self.config.sensitive_paths) {
            Some(EndpointClass::Sensitive)
        } else if !matches(&self.config.protected_paths) {
            None
        } else if authenticated {
            Some(EndpointClass::Authenticated)
        } else {
            Some(EndpointClass::Anonymous)
        }
    }

    pub fn identify(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> ClientIdentity {
        ClientIdentity::from_headers(headers, peer, &self.config.credential_headers)
    }

    /// Consume one token for `identity` in `class`.
    ///
    /// Never fails: when the store is unavailable or errors, the request is
    /// admitted and the decision is marked `fail_open`.
    pub async fn check(&self, identity: &ClientIdentity, class: EndpointClass) -> RateLimitDecision {
        let limit = self.limit_for(class);
        let now = self.clock.now_secs_f64();

        if !self.store_available().await {
            tracing::warn!(class = %class, "Rate limit store unavailable, allowing request");
            metrics::record_fail_open("store_unavailable");
            return RateLimitDecision::fail_open(class, limit, now);
        }

        let key = bucket_key(class, identity);
        let bucket = BucketSpec::new(limit.limit, Duration::from_secs(limit.window_secs));
        let grant = match self.cache.take_token(&key, bucket, now).await {
            Ok(grant) => grant,
            Err(StoreError::CircuitOpen(_)) => {
                tracing::warn!(class = %class, "Store circuit open, allowing request");
                metrics::record_fail_open("circuit_open");
                return RateLimitDecision::fail_open(class, limit, now);
            }
            Err(e) => {
                tracing::error!(class = %class, error = %e, "Rate limit evaluation failed, allowing request");
                metrics::record_fail_open("store_error");
                return RateLimitDecision::fail_open(class, limit, now);
            }
        };

        let decision = RateLimitDecision::from_grant(class, limit, grant, now);
        metrics::record_rate_limit(class.as_str(), identity.auth_type(), decision.allowed);
        if decision.allowed {
            tracing::debug!(client = %identity, class = %class, remaining = decision.remaining, "Request admitted");
        } else {
            tracing::warn!(
                client = %identity,
                class = %class,
                retry_after = ?decision.retry_after,
                "Rate limit exceeded"
            );
        }
        decision
    }

    /// Store availability, probed at most once per cooldown.
    async fn store_available(&self) -> bool {
        let now = self.clock.now();
        let cooldown = Duration::from_secs(self.config.availability_check_cooldown_secs);
        {
            let mut probe = self.probe.lock().unwrap_or_else(PoisonError::into_inner);
            let due = probe
                .last_check
                .map_or(true, |last| now.saturating_sub(last) >= cooldown);
            if !due {
                return probe.available;
            }
            probe.last_check = Some(now);
        }

        let available = self.cache.store_available().await;
        self.probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .available = available;
        available
    }
}

/// Store key of the bucket for `identity` in `class`.
pub fn bucket_key(class: EndpointClass, identity: &ClientIdentity) -> String {
    format!("ratelimit:{}:{}", class.as_str(), identity)
}
