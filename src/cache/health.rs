//! Cache health reporting.

use std::time::Duration;

use serde::Serialize;

/// Round trips slower than this report the cache as degraded.
pub const DEGRADED_LATENCY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Disabled,
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Severity order used when combining component statuses.
    fn rank(self) -> u8 {
        match self {
            HealthStatus::Disabled | HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        }
    }

    /// The more severe of two statuses.
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

/// Result of a cache health check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHealth {
    pub status: HealthStatus,
    pub latency_ms: f64,
    pub message: Option<String>,
}

impl CacheHealth {
    pub fn disabled() -> Self {
        Self {
            status: HealthStatus::Disabled,
            latency_ms: 0.0,
            message: Some("Cache is disabled".into()),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency_ms: 0.0,
            message: Some(message.into()),
        }
    }

    /// Classify a successful probe by its round-trip time.
    pub fn from_latency(latency: Duration) -> Self {
        let latency_ms = latency.as_secs_f64() * 1_000.0;
        if latency > DEGRADED_LATENCY {
            Self {
                status: HealthStatus::Degraded,
                latency_ms,
                message: Some(format!("High latency: {latency_ms:.2}ms")),
            }
        } else {
            Self {
                status: HealthStatus::Healthy,
                latency_ms,
                message: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_classification() {
        assert_eq!(
            CacheHealth::from_latency(Duration::from_millis(5)).status,
            HealthStatus::Healthy
        );
        let slow = CacheHealth::from_latency(Duration::from_millis(150));
        assert_eq!(slow.status, HealthStatus::Degraded);
        assert_eq!(slow.message.as_deref(), Some("High latency: 150.00ms"));
    }

    #[test]
    fn test_worst_ignores_disabled() {
        assert_eq!(HealthStatus::Disabled.worst(HealthStatus::Healthy), HealthStatus::Disabled);
        assert_eq!(HealthStatus::Healthy.worst(HealthStatus::Degraded), HealthStatus::Degraded);
        assert_eq!(HealthStatus::Unhealthy.worst(HealthStatus::Degraded), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(CacheHealth::disabled()).unwrap();
        assert_eq!(json["status"], "disabled");
        assert_eq!(json["message"], "Cache is disabled");
    }
}
