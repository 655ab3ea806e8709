//! Startup orchestration.
//!
//! Components are built once, in dependency order, and shared through `Arc`:
//! store → breakers → cache → rate limiter → upstream client.

use std::sync::Arc;

use thiserror::Error;

use crate::cache::{CacheClient, CACHE_BREAKER};
use crate::clock::Clock;
use crate::config::GuardConfig;
use crate::http::server::AppState;
use crate::http::upstream::Upstream;
use crate::ratelimit::RateLimiter;
use crate::resilience::{BreakerRegistry, CircuitBreaker};
use crate::store::{build_store, KeyValueStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store setup failed: {0}")]
    Store(#[from] StoreError),

    #[error("upstream client setup failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// Construct every runtime component from a validated configuration.
pub fn build_state(config: &GuardConfig, clock: Arc<dyn Clock>) -> Result<AppState, StartupError> {
    let store = build_store(&config.store, clock.clone())?;
    build_state_with_store(config, store, clock)
}

/// Construct the runtime components around an already built store.
pub fn build_state_with_store(
    config: &GuardConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
) -> Result<AppState, StartupError> {
    let breakers = Arc::new(BreakerRegistry::new(config.breakers.clone(), clock.clone()));
    let cache_breaker = Arc::new(CircuitBreaker::new(
        CACHE_BREAKER,
        &config.cache.breaker(),
        clock.clone(),
    ));
    breakers.insert(cache_breaker.clone());

    let cache = Arc::new(CacheClient::with_breaker(
        store,
        &config.cache,
        config.store.command_timeout(),
        cache_breaker,
    ));
    let limiter = Arc::new(RateLimiter::new(cache.clone(), config.rate_limit.clone(), clock));
    let upstream = Arc::new(Upstream::new(
        &config.upstream,
        breakers.get(&config.upstream.breaker),
    )?);

    tracing::info!(
        backend = ?config.store.backend,
        cache_enabled = config.cache.enabled,
        rate_limit_enabled = config.rate_limit.enabled,
        "Components initialized"
    );

    Ok(AppState {
        cache,
        limiter,
        breakers,
        upstream,
    })
}
