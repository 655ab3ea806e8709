//! Admission control middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::response::Rejection;
use crate::ratelimit::{rate_limit_headers, RateLimiter};

/// Authentication outcome, inserted as a request extension by the auth layer
/// in front of the limiter. Requests without it are anonymous.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub authenticated: bool,
}

/// Apply the distributed rate limit to protected paths.
///
/// Admitted responses carry the `X-RateLimit-*` headers; denials become a
/// 429 with `Retry-After`. Unprotected paths pass straight through.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authenticated = request
        .extensions()
        .get::<AuthContext>()
        .is_some_and(|ctx| ctx.authenticated);
    let Some(class) = limiter.classify(request.uri().path(), authenticated) else {
        return next.run(request).await;
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let identity = limiter.identify(request.headers(), peer);
    let decision = limiter.check(&identity, class).await;

    if !decision.allowed {
        return Rejection::RateLimited(decision).into_response();
    }

    let headers = rate_limit_headers(&decision);
    let mut response = next.run(request).await;
    response.headers_mut().extend(headers);
    response
}
