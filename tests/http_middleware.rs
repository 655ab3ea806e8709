//! End-to-end request handling through the axum router.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use admission_guard::admin::setup_admin_router;
use admission_guard::config::{BreakerConfig, GuardConfig, LimitConfig, RetryConfig, StoreBackend};
use admission_guard::http::{AuthContext, HttpServer};
use admission_guard::resilience::CircuitState;
use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

mod common;

async fn counting_backend(status: u16, body: &'static str) -> (SocketAddr, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let addr = common::start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (status, body.to_string())
        }
    })
    .await;
    (addr, hits)
}

fn config(upstream: SocketAddr) -> GuardConfig {
    let mut config = GuardConfig::default();
    config.store.backend = StoreBackend::Memory;
    config.upstream.base_url = format!("http://{upstream}");
    config.rate_limit.anonymous = LimitConfig::new(3, 60);
    config.upstream.retry = RetryConfig {
        max_attempts: 2,
        base_delay_ms: 10,
        max_delay_ms: 50,
    };
    config
}

fn router(h: &common::Harness) -> Router {
    HttpServer::build_router(&h.config, h.state.clone())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_protected_path_is_limited_with_headers() {
    let (addr, _) = counting_backend(200, "ok").await;
    let h = common::harness(config(addr));
    let app = router(&h);

    // Each spent token takes window / capacity = 20s to come back.
    for (remaining, reset) in [("2", "1700000020"), ("1", "1700000040"), ("0", "1700000060")] {
        let response = app.clone().oneshot(get("/api/v1/predict")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        assert_eq!(response.headers()["x-ratelimit-remaining"], remaining);
        assert_eq!(response.headers()["x-ratelimit-reset"], reset);
    }

    let response = app.clone().oneshot(get("/api/v1/predict")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "20");
    let body = json_body(response).await;
    assert_eq!(body["error"], "rate_limit_exceeded");
    assert_eq!(body["retry_after"], 20);
}

#[tokio::test]
async fn test_unprotected_paths_bypass_the_limiter() {
    let (addr, _) = counting_backend(200, "ok").await;
    let h = common::harness(config(addr));
    let app = router(&h);

    for _ in 0..10 {
        let response = app.clone().oneshot(get("/api/v2/other")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }
}

#[tokio::test]
async fn test_authenticated_requests_use_their_own_limit() {
    let (addr, _) = counting_backend(200, "ok").await;
    let h = common::harness(config(addr));

    let mut request = get("/api/v1/predict");
    request.headers_mut().insert("x-api-key", "k-123".parse().unwrap());
    request
        .extensions_mut()
        .insert(AuthContext { authenticated: true });

    let response = router(&h).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "100");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "99");
}

#[tokio::test]
async fn test_store_outage_admits_requests() {
    let (addr, _) = counting_backend(200, "ok").await;
    let h = common::harness(config(addr));
    h.store.set_available(false);
    let app = router(&h);

    for _ in 0..10 {
        let response = app.clone().oneshot(get("/api/v1/predict")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "3");
    }
}

#[tokio::test]
async fn test_upstream_responses_are_cached() {
    let (addr, hits) = counting_backend(200, "prediction").await;
    let mut cfg = config(addr);
    cfg.rate_limit.enabled = false;
    let h = common::harness(cfg);
    let app = router(&h);

    let first = app.clone().oneshot(get("/api/v1/predict?x=1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-cache"], "MISS");

    let second = app.clone().oneshot(get("/api/v1/predict?x=1")).await.unwrap();
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.headers()[header::CONTENT_TYPE], "text/plain");
    let body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"prediction");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_upstream_opens_its_breaker() {
    let (addr, hits) = counting_backend(500, "boom").await;
    let mut cfg = config(addr);
    cfg.rate_limit.enabled = false;
    cfg.breakers.insert(
        "upstream".into(),
        BreakerConfig {
            failure_threshold: 2,
            ..BreakerConfig::default()
        },
    );
    let h = common::harness(cfg);
    let app = router(&h);

    // Both attempts of the first request fail and open the breaker.
    let response = app.clone().oneshot(get("/api/v1/predict")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(h.state.upstream.breaker().state(), CircuitState::Open);

    let response = app.clone().oneshot(get("/api/v1/predict")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["breaker"], "upstream");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_transient_upstream_failure_is_retried() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let addr = common::start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                (503, "warming up".to_string())
            } else {
                (200, "prediction".to_string())
            }
        }
    })
    .await;
    let mut cfg = config(addr);
    cfg.rate_limit.enabled = false;
    let h = common::harness(cfg);
    let app = router(&h);

    let response = app.clone().oneshot(get("/api/v1/predict")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(h.state.upstream.breaker().state(), CircuitState::Closed);
    assert_eq!(h.state.upstream.breaker().failure_count(), 0);
}

#[tokio::test]
async fn test_health_reports_cache_outage() {
    let (addr, _) = counting_backend(200, "ok").await;
    let mut cfg = config(addr);
    cfg.cache.failure_threshold = 1;
    let h = common::harness(cfg);
    let app = router(&h);

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");

    h.store.set_available(false);
    assert!(!h.state.cache.is_available().await);

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["cache"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_admin_api_requires_key_and_resets_breakers() {
    let (addr, _) = counting_backend(200, "ok").await;
    let h = common::harness(config(addr));
    let admin = setup_admin_router(h.state.clone(), "s3cret");

    let response = admin.clone().oneshot(get("/admin/breakers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let authed = |method: Method, uri: &str| {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::empty())
            .unwrap()
    };

    let response = admin
        .clone()
        .oneshot(authed(Method::GET, "/admin/breakers"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.as_array().map(Vec::len), Some(2));

    let cache_breaker = h.state.cache.breaker();
    h.store.set_available(false);
    for _ in 0..5 {
        h.state.cache.get::<u8>("k").await;
    }
    assert_eq!(cache_breaker.state(), CircuitState::Open);

    let response = admin
        .clone()
        .oneshot(authed(Method::POST, "/admin/breakers/cache/reset"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["state"], "closed");
    assert_eq!(cache_breaker.state(), CircuitState::Closed);

    let response = admin
        .oneshot(authed(Method::POST, "/admin/breakers/missing/reset"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
