//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the health and upstream handlers
//! - Wire up middleware (tracing, request ID, timeout, metrics, rate limiting)
//! - Bind the router to a listener with connect info for client addresses
//! - Stop accepting and drain on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::cache::CacheClient;
use crate::config::GuardConfig;
use crate::http::health::health_handler;
use crate::http::middleware::{rate_limit_middleware, record_metrics};
use crate::http::upstream::{upstream_handler, Upstream};
use crate::lifecycle::Shutdown;
use crate::ratelimit::RateLimiter;
use crate::resilience::BreakerRegistry;

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub cache: Arc<CacheClient>,
    pub limiter: Arc<RateLimiter>,
    pub breakers: Arc<BreakerRegistry>,
    pub upstream: Arc<Upstream>,
}

/// HTTP server for the guarded service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &GuardConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers run outermost first: trace, request ID, timeout, metrics, rate limit.
    #[allow(deprecated)]
    pub fn build_router(config: &GuardConfig, state: AppState) -> Router {
        let limiter = state.limiter.clone();
        Router::new()
            .route("/health", get(health_handler))
            .route("/api/{*path}", get(upstream_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
            .layer(middleware::from_fn(record_metrics))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
