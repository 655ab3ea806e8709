//! Circuit breaker for protected operations.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: testing if dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: recovery_timeout elapsed since last failure
//! Half-Open → Closed: probe call succeeds
//! Half-Open → Open: probe call fails
//! ```
//!
//! # Design Decisions
//! - One breaker per protected resource, shared through `Arc`
//! - All transitions happen under a single mutex; the lock is never held
//!   across the protected call itself
//! - Single probe in Half-Open; concurrent callers are rejected until it settles
//! - Whitelisted failure kinds pass through without any bookkeeping
//! - A probe whose future is dropped releases the probe slot on drop

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::clock::Clock;
use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::types::{CircuitOpenError, CircuitState, Classify, FailureKind};

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Duration>,
    last_transition: Duration,
    probe_in_flight: bool,
    success_count: u64,
    total_failures: u64,
    rejected_count: u64,
}

/// Read-only snapshot of a breaker's counters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    /// Consecutive failures counted toward the threshold.
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub success_count: u64,
    /// Failures recorded over the breaker's lifetime.
    pub total_failures: u64,
    pub rejected_count: u64,
    /// Seconds since the Unix epoch.
    pub last_failure_at: Option<f64>,
    /// Seconds since the Unix epoch.
    pub last_transition_at: f64,
}

/// A three-state circuit breaker guarding one resource.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    exception_whitelist: HashSet<FailureKind>,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker in the Closed state.
    pub fn new(name: impl Into<String>, config: &BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: config.recovery_timeout(),
            exception_whitelist: config.exception_whitelist.iter().copied().collect(),
            clock,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                last_transition: now,
                probe_in_flight: false,
                success_count: 0,
                total_failures: 0,
                rejected_count: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Time left before an open circuit admits a probe, if it is open.
    pub fn remaining_open_time(&self) -> Option<Duration> {
        let st = self.lock();
        if st.state != CircuitState::Open {
            return None;
        }
        let since = st
            .last_failure_time
            .map(|t| self.clock.now().saturating_sub(t))
            .unwrap_or(self.recovery_timeout);
        Some(self.recovery_timeout.saturating_sub(since))
    }

    /// Run an async operation under protection.
    ///
    /// The operation's own error is returned unchanged. When the circuit is
    /// open the operation is not invoked and the rejection is converted into
    /// the caller's error type through `From<CircuitOpenError>`.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<CircuitOpenError> + std::fmt::Display,
    {
        let permit = self.acquire()?;
        let started = Instant::now();
        let result = operation().await;
        permit.settle(&result, started.elapsed());
        result
    }

    /// Blocking variant of [`call`](Self::call) for synchronous operations.
    pub fn call_sync<F, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Classify + From<CircuitOpenError> + std::fmt::Display,
    {
        let permit = self.acquire()?;
        let started = Instant::now();
        let result = operation();
        permit.settle(&result, started.elapsed());
        result
    }

    /// Force the breaker closed and clear the failure count.
    pub fn reset(&self) {
        let mut st = self.lock();
        let prev = st.state;
        st.failure_count = 0;
        st.probe_in_flight = false;
        if prev != CircuitState::Closed {
            tracing::info!(breaker = %self.name, from = %prev, "Circuit manually reset");
            self.transition(&mut st, CircuitState::Closed);
        }
    }

    /// Snapshot of the breaker's counters.
    pub fn metrics(&self) -> BreakerMetrics {
        let st = self.lock();
        BreakerMetrics {
            name: self.name.clone(),
            state: st.state,
            failure_count: st.failure_count,
            failure_threshold: self.failure_threshold,
            success_count: st.success_count,
            total_failures: st.total_failures,
            rejected_count: st.rejected_count,
            last_failure_at: st.last_failure_time.map(|t| t.as_secs_f64()),
            last_transition_at: st.last_transition.as_secs_f64(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self) -> Result<Permit<'_>, CircuitOpenError> {
        let mut st = self.lock();
        match st.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                let elapsed = st
                    .last_failure_time
                    .map(|t| self.clock.now().saturating_sub(t));
                if elapsed.map_or(true, |e| e >= self.recovery_timeout) {
                    self.transition(&mut st, CircuitState::HalfOpen);
                    st.probe_in_flight = true;
                    Ok(Permit::new(self, true))
                } else {
                    Err(self.reject(&mut st))
                }
            }
            CircuitState::HalfOpen => {
                if st.probe_in_flight {
                    Err(self.reject(&mut st))
                } else {
                    st.probe_in_flight = true;
                    Ok(Permit::new(self, true))
                }
            }
        }
    }

    fn reject(&self, st: &mut BreakerState) -> CircuitOpenError {
        st.rejected_count += 1;
        metrics::record_breaker_rejected(&self.name);
        tracing::debug!(breaker = %self.name, state = %st.state, "Call rejected by open circuit");
        CircuitOpenError {
            name: self.name.clone(),
        }
    }

    fn on_success(&self, probe: bool) {
        let mut st = self.lock();
        st.success_count += 1;
        if probe {
            st.probe_in_flight = false;
        }
        match st.state {
            CircuitState::HalfOpen => {
                st.failure_count = 0;
                self.transition(&mut st, CircuitState::Closed);
            }
            CircuitState::Closed => st.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, probe: bool, error: &dyn std::fmt::Display) {
        let mut st = self.lock();
        st.total_failures += 1;
        st.last_failure_time = Some(self.clock.now());
        if probe {
            st.probe_in_flight = false;
        }
        match st.state {
            CircuitState::Closed => {
                st.failure_count += 1;
                tracing::warn!(
                    breaker = %self.name,
                    failures = st.failure_count,
                    threshold = self.failure_threshold,
                    error = %error,
                    "Breaker registered failure"
                );
                if st.failure_count >= self.failure_threshold {
                    self.transition(&mut st, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                st.failure_count += 1;
                tracing::warn!(breaker = %self.name, error = %error, "Recovery probe failed");
                self.transition(&mut st, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn release_probe(&self) {
        self.lock().probe_in_flight = false;
    }

    fn transition(&self, st: &mut BreakerState, to: CircuitState) {
        let from = st.state;
        if from == to {
            return;
        }
        st.state = to;
        st.last_transition = self.clock.now();
        if to == CircuitState::Open {
            tracing::warn!(breaker = %self.name, from = %from, to = %to, "Circuit state changed");
        } else {
            tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit state changed");
        }
        metrics::record_breaker_transition(&self.name, from, to);
    }
}

/// Admission to run one call; settles breaker bookkeeping exactly once.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    armed: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            armed: true,
        }
    }

    fn settle<T, E>(mut self, result: &Result<T, E>, elapsed: Duration)
    where
        E: Classify + std::fmt::Display,
    {
        self.armed = false;
        let name = self.breaker.name.as_str();
        match result {
            Ok(_) => {
                self.breaker.on_success(self.probe);
                metrics::record_breaker_call(name, "success", elapsed);
            }
            Err(e) if self.breaker.exception_whitelist.contains(&e.failure_kind()) => {
                if self.probe {
                    self.breaker.release_probe();
                }
                metrics::record_breaker_call(name, "ignored", elapsed);
            }
            Err(e) => {
                self.breaker.on_failure(self.probe, e);
                metrics::record_breaker_call(name, "failure", elapsed);
            }
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.armed && self.probe {
            self.breaker.release_probe();
        }
    }
}
