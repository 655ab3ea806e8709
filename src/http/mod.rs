//! HTTP integration subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → middleware/rate_limit.rs (admission decision, X-RateLimit-* headers)
//!     → health.rs (GET /health) or upstream.rs (GET /api/..., cached)
//!     → response.rs (429 / 502 / 503 rejections)
//!     → Send to client
//! ```

pub mod health;
pub mod middleware;
pub mod response;
pub mod server;
pub mod upstream;

pub use middleware::AuthContext;
pub use response::Rejection;
pub use server::{AppState, HttpServer};
