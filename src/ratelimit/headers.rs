//! Rate limit response headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::ratelimit::limiter::RateLimitDecision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Headers describing `decision`; `Retry-After` only on denials.
pub fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(4);
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at));
    if let Some(secs) = decision.retry_after_secs() {
        headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(secs));
    }
    headers
}
