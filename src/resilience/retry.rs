//! Retry with exponential backoff and jitter.
//!
//! # Design Decisions
//! - Only transient failure kinds are retried; input errors fail at once
//! - An open-circuit rejection is never retried, the breaker already decided
//! - Jitter of up to 10% of the delay keeps synchronized callers apart
//! - Wraps a breaker call from the outside, so every attempt is counted

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::types::{Classify, FailureKind};

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Whether a failure of this kind may succeed on a later attempt.
pub fn is_retryable(kind: FailureKind) -> bool {
    matches!(
        kind,
        FailureKind::Connection | FailureKind::Timeout | FailureKind::Backend | FailureKind::Unavailable
    )
}

/// Run `operation` until it succeeds, fails with a non-retryable kind, or
/// `policy.max_attempts` is used up. The last error is returned unchanged.
pub async fn retry<F, Fut, T, E>(policy: &RetryConfig, name: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= max_attempts || !is_retryable(err.failure_kind()) {
            return Err(err);
        }

        let delay = calculate_backoff(attempt, policy.base_delay_ms, policy.max_delay_ms);
        tracing::warn!(
            operation = name,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Attempt failed, retrying"
        );
        metrics::record_retry(name);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
