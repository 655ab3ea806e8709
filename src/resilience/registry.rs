//! Named breaker registry.
//!
//! # Responsibilities
//! - Hold one breaker per protected resource, memoized by name
//! - Resolve per-name configuration, falling back to the `default` entry
//! - Enumerate breakers for health and admin reporting

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::Clock;
use crate::config::BreakerConfig;
use crate::resilience::circuit_breaker::{BreakerMetrics, CircuitBreaker};

/// Name of the configuration entry used for breakers without their own.
pub const DEFAULT_BREAKER: &str = "default";

/// Process-wide collection of breakers, constructed once at startup.
#[derive(Debug)]
pub struct BreakerRegistry {
    configs: HashMap<String, BreakerConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    clock: Arc<dyn Clock>,
}

impl BreakerRegistry {
    pub fn new(configs: HashMap<String, BreakerConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            configs,
            breakers: DashMap::new(),
            clock,
        }
    }

    /// Get the breaker for `name`, creating it on first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self.config_for(name);
                tracing::debug!(
                    breaker = %name,
                    threshold = config.failure_threshold,
                    recovery_secs = config.recovery_timeout_secs,
                    "Creating circuit breaker"
                );
                Arc::new(CircuitBreaker::new(name, &config, self.clock.clone()))
            })
            .value()
            .clone()
    }

    /// Register an externally constructed breaker under its own name.
    pub fn insert(&self, breaker: Arc<CircuitBreaker>) {
        self.breakers.insert(breaker.name().to_string(), breaker);
    }

    /// Look up an existing breaker without creating one.
    pub fn find(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|r| r.value().clone())
    }

    /// Metrics for every breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerMetrics> {
        let mut all: Vec<BreakerMetrics> = self.breakers.iter().map(|r| r.value().metrics()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn config_for(&self, name: &str) -> BreakerConfig {
        self.configs
            .get(name)
            .or_else(|| self.configs.get(DEFAULT_BREAKER))
            .cloned()
            .unwrap_or_default()
    }
}
