//! Axum middleware.

pub mod metrics;
pub mod rate_limit;

pub use self::metrics::record_metrics;
pub use rate_limit::{rate_limit_middleware, AuthContext};
