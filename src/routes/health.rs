use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

use crate::models::{CacheState, CacheStats};
use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "StreamViX Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "runtime": "rust"
    }))
}

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime: u64,
    channel_cache: CacheStats,
    catalog_channels: usize,
    live_tv: bool,
}

/// GET /health - status with cache stats
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    let channel_cache = state.cache.stats().await;

    // An empty or stale cache still serves static tiers
    let status = if channel_cache.state == CacheState::Empty || channel_cache.stale {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        uptime,
        channel_cache,
        catalog_channels: state.catalog.len(),
        live_tv: state.settings.live_tv_enabled,
    })
}

/// GET /metrics - Prometheus metrics
pub async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                b"Internal Server Error".to_vec(),
            )
        }
    }
}

/// Readiness check (for Kubernetes)
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Streams resolve without the link cache; it only adds live tiers
    match state.cache.state().await {
        CacheState::Empty => (StatusCode::OK, "ready (channel cache empty)"),
        CacheState::Refreshing => (StatusCode::OK, "ready (channel cache refreshing)"),
        CacheState::Loaded => (StatusCode::OK, "ready"),
    }
}

/// Liveness check (for Kubernetes)
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}
