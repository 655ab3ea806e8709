//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define guard metrics (breaker outcomes, cache operations, admission decisions)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `breaker_calls_total` (counter): calls by breaker, outcome
//! - `breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `breaker_transitions_total` (counter): state changes by breaker, from, to
//! - `retries_total` (counter): retried attempts by operation
//! - `cache_operations_total` (counter): cache ops by op, outcome
//! - `rate_limit_requests_total` / `rate_limit_exceeded_total` (counter)
//! - `rate_limit_fail_open_total` (counter): admissions granted without a store decision
//! - `http_requests_total` / `http_request_duration_seconds`
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so library users and tests pay nothing
//! - Label values are low-cardinality (no client identities, no keys)

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record the outcome of a call made through a breaker.
pub fn record_breaker_call(breaker: &str, outcome: &'static str, elapsed: Duration) {
    counter!("breaker_calls_total", "breaker" => breaker.to_string(), "outcome" => outcome)
        .increment(1);
    histogram!("breaker_call_duration_seconds", "breaker" => breaker.to_string(), "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

/// Record a call rejected by an open breaker.
pub fn record_breaker_rejected(breaker: &str) {
    counter!("breaker_calls_total", "breaker" => breaker.to_string(), "outcome" => "rejected")
        .increment(1);
}

/// Record a breaker state change.
pub fn record_breaker_transition(breaker: &str, from: CircuitState, to: CircuitState) {
    counter!(
        "breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    gauge!("breaker_state", "breaker" => breaker.to_string()).set(to.as_gauge());
}

/// Record a retried attempt.
pub fn record_retry(operation: &str) {
    counter!("retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record a cache operation.
pub fn record_cache_op(op: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!("cache_operations_total", "op" => op, "outcome" => outcome).increment(1);
    histogram!("cache_operation_duration_seconds", "op" => op).record(elapsed.as_secs_f64());
}

/// Record an admission decision.
pub fn record_rate_limit(class: &'static str, auth_type: &'static str, allowed: bool) {
    counter!("rate_limit_requests_total", "class" => class, "auth_type" => auth_type)
        .increment(1);
    if !allowed {
        counter!("rate_limit_exceeded_total", "class" => class, "auth_type" => auth_type)
            .increment(1);
    }
}

/// Record an admission granted because the store could not decide.
pub fn record_fail_open(reason: &'static str) {
    counter!("rate_limit_fail_open_total", "reason" => reason).increment(1);
}

/// Record a completed HTTP request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!("http_requests_total", "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!("http_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}
