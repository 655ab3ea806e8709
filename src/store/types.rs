//! Store error and token bucket types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resilience::{CircuitOpenError, Classify, FailureKind, TimeoutError};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a key-value store or the guards wrapped around it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("store command timed out after {0:?}")]
    Timeout(Duration),

    #[error("store command failed: {0}")]
    Backend(String),

    #[error("value encoding failed: {0}")]
    Serialization(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

impl Classify for StoreError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            StoreError::Connection(_) => FailureKind::Connection,
            StoreError::Timeout(_) => FailureKind::Timeout,
            StoreError::Backend(_) => FailureKind::Backend,
            StoreError::Serialization(_) => FailureKind::Serialization,
            StoreError::Unavailable(_) => FailureKind::Unavailable,
            StoreError::CircuitOpen(_) => FailureKind::CircuitOpen,
        }
    }
}

impl TimeoutError for StoreError {
    fn timed_out(after: Duration) -> Self {
        StoreError::Timeout(after)
    }
}

/// Size and refill window of one token bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSpec {
    pub capacity: u32,
    pub window: Duration,
}

impl BucketSpec {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self { capacity, window }
    }

    /// Expiry applied to the bucket key on every evaluation.
    pub fn ttl(&self) -> Duration {
        self.window * 2
    }
}

/// Result of one atomic take attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenGrant {
    pub allowed: bool,
    /// Tokens left after the attempt (fractional).
    pub tokens: f64,
}

/// Persisted bucket state: fractional tokens and the last refill instant in
/// epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    pub tokens: f64,
    pub last_refill: f64,
}

impl BucketState {
    /// A bucket that has never been used.
    pub fn full(spec: BucketSpec, now: f64) -> Self {
        Self {
            tokens: f64::from(spec.capacity),
            last_refill: now,
        }
    }

    /// Tokens available at `now`. Clock skew backwards refills nothing.
    pub fn refilled(&self, spec: BucketSpec, now: f64) -> f64 {
        let elapsed = (now - self.last_refill).max(0.0);
        let capacity = f64::from(spec.capacity);
        (self.tokens + elapsed * capacity / spec.window.as_secs_f64()).min(capacity)
    }

    /// Refill then try to consume one token. State only changes on success.
    pub fn take(&mut self, spec: BucketSpec, now: f64) -> TokenGrant {
        let available = self.refilled(spec, now);
        if available >= 1.0 {
            self.tokens = available - 1.0;
            self.last_refill = now;
            TokenGrant {
                allowed: true,
                tokens: self.tokens,
            }
        } else {
            TokenGrant {
                allowed: false,
                tokens: available,
            }
        }
    }
}
