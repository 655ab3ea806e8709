use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::cache::CacheHealth;
use crate::http::server::AppState;
use crate::resilience::BreakerMetrics;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerMetrics>> {
    Json(state.breakers.snapshot())
}

/// Force a breaker closed. Unknown names are 404; breakers are never created here.
pub async fn reset_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerMetrics>, StatusCode> {
    let breaker = state.breakers.find(&name).ok_or(StatusCode::NOT_FOUND)?;
    breaker.reset();
    tracing::info!(breaker = %name, "Breaker reset via admin API");
    Ok(Json(breaker.metrics()))
}

pub async fn get_cache(State(state): State<AppState>) -> Json<CacheHealth> {
    Json(state.cache.health_check().await)
}
