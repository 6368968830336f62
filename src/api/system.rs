use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};

use crate::api::envelope::ApiResponse;
use crate::api::latency::LatencySnapshot;
use crate::api::routes::ApiState;
use crate::config::APP_VERSION;
use crate::error::Result;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/database", get(database_health))
        .route("/stats/latency", get(latency))
}

async fn root() -> ApiResponse<Value> {
    ApiResponse::ok(
        "Market results API",
        json!({ "service": env!("CARGO_PKG_NAME"), "version": APP_VERSION }),
    )
}

async fn health(State(state): State<ApiState>) -> ApiResponse<Value> {
    let snap = state.health.snapshot();
    ApiResponse::ok(
        "Service healthy",
        json!({
            "status": "healthy",
            "version": APP_VERSION,
            "uptime_secs": snap.uptime_secs,
            "sync_enabled": state.config.sync_source.is_some(),
            "last_sync_at": snap.last_sync_at,
            "last_sync_ok": snap.last_sync_ok,
            "last_cache_warm_at": snap.last_cache_warm_at,
            "cached_dates": state.cache.cached_dates(),
        }),
    )
}

async fn database_health(State(state): State<ApiState>) -> Result<ApiResponse<Value>> {
    state.store.ping().await?;
    Ok(ApiResponse::ok("Database healthy", json!({ "database": "connected" })))
}

async fn latency(State(state): State<ApiState>) -> ApiResponse<LatencySnapshot> {
    ApiResponse::ok("Request latency", state.latency.snapshot())
}
