//! Distributed rate limiting subsystem.
//!
//! # Data Flow
//! ```text
//! Request (path, headers, peer, AuthContext)
//!     → limiter.rs classify (unlisted paths bypass)
//!     → identity.rs (credential digest or client address)
//!     → limiter.rs check
//!         → throttled store availability probe (fail open if down)
//!         → CacheClient::take_token (atomic bucket step on the store)
//!     → RateLimitDecision
//!     → headers.rs (X-RateLimit-*, Retry-After)
//! ```
//!
//! # Design Decisions
//! - Bucket state lives in the shared store so every instance enforces one limit
//! - Store failures admit traffic (fail open) and are logged and counted
//! - Buckets expire after two idle windows
//! - Buckets use the store even when response caching is disabled

pub mod headers;
pub mod identity;
pub mod limiter;

pub use headers::rate_limit_headers;
pub use identity::ClientIdentity;
pub use limiter::{bucket_key, EndpointClass, RateLimitDecision, RateLimiter};
