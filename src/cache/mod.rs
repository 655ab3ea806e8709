//! Degrading cache subsystem.
//!
//! # Data Flow
//! ```text
//! caller value
//!     → codec.rs (JSON or MessagePack bytes)
//!     → client.rs (breaker admission + command deadline)
//!     → KeyValueStore
//!     → miss / false / None on any backend failure
//! ```
//!
//! # Design Decisions
//! - The cache never raises backend errors to its callers
//! - Decoding happens after the breaker settles, so a corrupt entry is a
//!   miss and does not count against the store's health
//! - Health checks observe the circuit but never drive it

pub mod client;
pub mod codec;
pub mod health;

pub use client::{CacheClient, CACHE_BREAKER};
pub use codec::Serializer;
pub use health::{CacheHealth, HealthStatus};
