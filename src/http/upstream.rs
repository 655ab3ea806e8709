//! Cached, breaker-protected upstream forwarding.
//!
//! # Data Flow
//! ```text
//! GET /api/...
//!     → response cache lookup (hit: answer immediately)
//!     → retry (transient failures, jittered backoff)
//!     → upstream breaker → reqwest GET with timeout
//!     → 200 responses cached for upstream.cache_ttl_secs
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheClient;
use crate::config::{RetryConfig, UpstreamConfig};
use crate::http::response::Rejection;
use crate::http::server::AppState;
use crate::resilience::{retry, CircuitBreaker, CircuitOpenError, Classify, FailureKind};

/// Marks whether a response came from the cache.
pub const X_CACHE: &str = "x-cache";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned {0}")]
    Status(StatusCode),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

impl Classify for UpstreamError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            UpstreamError::Request(e) if e.is_timeout() => FailureKind::Timeout,
            UpstreamError::Request(e) if e.is_connect() => FailureKind::Connection,
            UpstreamError::Request(e) if e.is_decode() || e.is_body() => FailureKind::Serialization,
            UpstreamError::Request(_) => FailureKind::Other,
            UpstreamError::Status(_) => FailureKind::Backend,
            UpstreamError::CircuitOpen(_) => FailureKind::CircuitOpen,
        }
    }
}

/// An upstream response as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    fn into_response_with(self, cache_state: &'static str) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        if let Some(ct) = self.content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
            headers.insert(header::CONTENT_TYPE, ct);
        }
        headers.insert(X_CACHE, HeaderValue::from_static(cache_state));
        response
    }
}

/// HTTP client for the guarded upstream service.
#[derive(Debug)]
pub struct Upstream {
    client: reqwest::Client,
    base_url: String,
    cache_ttl: Duration,
    retry: RetryConfig,
    breaker: Arc<CircuitBreaker>,
}

impl Upstream {
    pub fn new(config: &UpstreamConfig, breaker: Arc<CircuitBreaker>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            retry: config.retry,
            breaker,
        })
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// GET `path_and_query` from the upstream through its breaker, retrying
    /// transient failures.
    ///
    /// 5xx answers count as failures; other statuses are returned as-is.
    pub async fn fetch(&self, path_and_query: &str) -> Result<CachedResponse, UpstreamError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let url = url.as_str();
        let client = &self.client;
        let breaker = &self.breaker;
        retry(&self.retry, breaker.name(), move || {
            breaker.call(move || async move {
                let response = client.get(url).send().await?;
                let status = response.status();
                if status.is_server_error() {
                    return Err(UpstreamError::Status(status));
                }
                let content_type = response
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let body = response.bytes().await?.to_vec();
                Ok(CachedResponse {
                    status: status.as_u16(),
                    content_type,
                    body,
                })
            })
        })
        .await
    }
}

/// Serve GET requests from the response cache, falling back to the upstream.
pub async fn upstream_handler(State(state): State<AppState>, uri: Uri) -> Response {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let key = CacheClient::generate_key(["upstream", target]);

    if let Some(hit) = state.cache.get::<CachedResponse>(&key).await {
        tracing::debug!(target, "Serving upstream response from cache");
        return hit.into_response_with("HIT");
    }

    match state.upstream.fetch(target).await {
        Ok(fetched) => {
            if fetched.status == StatusCode::OK.as_u16() && !state.upstream.cache_ttl.is_zero() {
                state
                    .cache
                    .set(&key, &fetched, Some(state.upstream.cache_ttl))
                    .await;
            }
            fetched.into_response_with("MISS")
        }
        Err(UpstreamError::CircuitOpen(e)) => Rejection::CircuitOpen { name: e.name }.into_response(),
        Err(e) => {
            tracing::warn!(target, error = %e, "Upstream request failed");
            Rejection::Upstream(e.to_string()).into_response()
        }
    }
}
