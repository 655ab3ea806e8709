//! Breaker states, failure classification, and the open-circuit rejection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through and failures are counted.
    Closed,
    /// Calls are rejected without invoking the operation.
    Open,
    /// A single trial call is permitted to test recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Gauge encoding used by the metrics sink.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of failure a protected operation can produce.
///
/// Breakers are configured with a whitelist over these kinds; whitelisted
/// failures are passed through without touching breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connection,
    Timeout,
    Backend,
    Serialization,
    InvalidInput,
    NotFound,
    Unavailable,
    /// Rejected by an open circuit without being attempted.
    CircuitOpen,
    Other,
}

/// Maps an error onto a [`FailureKind`].
pub trait Classify {
    fn failure_kind(&self) -> FailureKind;
}

/// Returned instead of invoking the operation while a circuit is open.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("circuit '{name}' is open; call rejected")]
pub struct CircuitOpenError {
    /// Name of the breaker that rejected the call.
    pub name: String,
}

impl Classify for CircuitOpenError {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::CircuitOpen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_names() {
        let kinds: Vec<FailureKind> =
            serde_json::from_str(r#"["invalid_input", "not_found", "timeout"]"#).unwrap();
        assert_eq!(
            kinds,
            vec![FailureKind::InvalidInput, FailureKind::NotFound, FailureKind::Timeout]
        );
    }

    #[test]
    fn test_open_error_display() {
        let err = CircuitOpenError { name: "model-store".into() };
        assert_eq!(err.to_string(), "circuit 'model-store' is open; call rejected");
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
        assert_eq!(CircuitState::Open.as_gauge(), 1.0);
    }
}
