//! Aggregate health endpoint.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::cache::{CacheHealth, HealthStatus};
use crate::http::server::AppState;
use crate::resilience::{BreakerMetrics, CircuitState};

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub cache: CacheHealth,
    pub breakers: Vec<BreakerMetrics>,
}

impl HealthReport {
    /// Overall status: the worst of the cache and every breaker.
    /// Breakers that are not closed degrade the service.
    pub fn new(cache: CacheHealth, breakers: Vec<BreakerMetrics>) -> Self {
        let status = breakers
            .iter()
            .filter(|b| b.state != CircuitState::Closed)
            .fold(HealthStatus::Healthy.worst(cache.status), |acc, _| {
                acc.worst(HealthStatus::Degraded)
            });
        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
            cache,
            breakers,
        }
    }
}

/// `GET /health`: 200 unless unhealthy, then 503.
pub async fn health_handler(State(state): State<AppState>) -> Response {
    let report = HealthReport::new(state.cache.health_check().await, state.breakers.snapshot());
    let code = if report.status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(state: CircuitState) -> BreakerMetrics {
        BreakerMetrics {
            name: "upstream".into(),
            state,
            failure_count: 0,
            failure_threshold: 5,
            success_count: 0,
            total_failures: 0,
            rejected_count: 0,
            last_failure_at: None,
            last_transition_at: 0.0,
        }
    }

    #[test]
    fn test_overall_status() {
        let healthy = CacheHealth::from_latency(std::time::Duration::from_millis(1));
        assert_eq!(
            HealthReport::new(healthy.clone(), vec![breaker(CircuitState::Closed)]).status,
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthReport::new(healthy, vec![breaker(CircuitState::HalfOpen)]).status,
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthReport::new(CacheHealth::disabled(), vec![]).status,
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthReport::new(CacheHealth::unhealthy("down"), vec![breaker(CircuitState::Open)]).status,
            HealthStatus::Unhealthy
        );
    }
}
