//! Error responses.
//!
//! # Design Decisions
//! - Every rejection is JSON with a stable `error` code
//! - Rate limit denials carry the same headers as admitted requests plus `Retry-After`
//! - An open circuit is 503; a failed upstream call is 502

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::ratelimit::{rate_limit_headers, RateLimitDecision};

/// Reasons the guard answers a request itself.
#[derive(Debug)]
pub enum Rejection {
    RateLimited(RateLimitDecision),
    CircuitOpen { name: String },
    Upstream(String),
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Rejection::RateLimited(decision) => {
                let retry_after = decision.retry_after_secs().unwrap_or(1);
                let body = Json(json!({
                    "error": "rate_limit_exceeded",
                    "detail": format!("Rate limit exceeded. Try again in {retry_after} seconds."),
                    "retry_after": retry_after,
                }));
                (StatusCode::TOO_MANY_REQUESTS, rate_limit_headers(&decision), body).into_response()
            }
            Rejection::CircuitOpen { name } => {
                let body = Json(json!({
                    "error": "service_unavailable",
                    "detail": format!("Dependency '{name}' is temporarily unavailable"),
                    "breaker": name,
                }));
                (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
            }
            Rejection::Upstream(detail) => {
                let body = Json(json!({
                    "error": "bad_gateway",
                    "detail": detail,
                }));
                (StatusCode::BAD_GATEWAY, body).into_response()
            }
        }
    }
}
