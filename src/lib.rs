//! Admission guard: circuit breaking, a degrading shared cache, and
//! distributed rate limiting for HTTP services.

pub mod admin;
pub mod cache;
pub mod clock;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod ratelimit;
pub mod resilience;
pub mod store;

pub use cache::CacheClient;
pub use config::GuardConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use ratelimit::RateLimiter;
pub use resilience::CircuitBreaker;
