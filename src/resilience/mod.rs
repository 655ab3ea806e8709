//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a protected dependency:
//!     → retry.rs (transient failures retried with jittered backoff)
//!     → registry.rs (resolve the named breaker)
//!     → circuit_breaker.rs (admit, reject, or probe)
//!     → timeouts.rs (enforce the backend deadline)
//!     → outcome recorded back into the breaker
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - Breakers are constructed once and shared, never ambient globals
//! - Callers keep their own error types; open-circuit rejection is a distinct variant

pub mod circuit_breaker;
pub mod registry;
pub mod retry;
pub mod timeouts;
pub mod types;

pub use circuit_breaker::{BreakerMetrics, CircuitBreaker};
pub use registry::BreakerRegistry;
pub use retry::{calculate_backoff, is_retryable, retry};
pub use timeouts::{with_timeout, TimeoutError};
pub use types::{CircuitOpenError, CircuitState, Classify, FailureKind};
