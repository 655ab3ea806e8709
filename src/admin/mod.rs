//! Operator API.
//!
//! Served on its own listener (`admin.bind_address`), every route behind
//! Bearer-token authentication.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::{admin_auth_middleware, AdminKey};
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState, api_key: &str) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/breakers/{name}/reset", post(reset_breaker))
        .route("/admin/cache", get(get_cache))
        .layer(middleware::from_fn_with_state(
            AdminKey(api_key.into()),
            admin_auth_middleware,
        ))
        .with_state(state)
}
