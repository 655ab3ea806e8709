//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend round trips with a deadline
//! - Turn an elapsed deadline into the caller's own timeout error
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors flow through the same failure path as any other backend error

use std::future::Future;
use std::time::Duration;

/// Errors that can represent an elapsed deadline.
pub trait TimeoutError {
    fn timed_out(after: Duration) -> Self;
}

/// Await `fut`, failing with `E::timed_out` once `limit` elapses.
pub async fn with_timeout<T, E, Fut>(limit: Duration, fut: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: TimeoutError,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(E::timed_out(limit)),
    }
}
