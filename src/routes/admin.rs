//! Admin endpoints for the channel-link cache

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::CacheStats;
use crate::services::channel_cache::RefreshOutcome;
use crate::AppState;

/// Query params for admin operations
#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    /// Admin key for authorization (simple protection)
    pub key: Option<String>,
}

/// Cache stats response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsResponse {
    pub cache: CacheStats,
    pub catalog_channels: usize,
    pub categories: BTreeMap<String, usize>,
}

/// Refresh response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<usize>,
}

type AdminError = (StatusCode, Json<serde_json::Value>);

/// Admin routes are closed when no ADMIN_KEY is configured
fn validate_admin_key(state: &AppState, provided_key: Option<&str>) -> Result<(), AdminError> {
    match (state.config.admin_key.as_deref(), provided_key) {
        (Some(expected), Some(key)) if key == expected => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid or missing admin key" })),
        )),
    }
}

/// GET /api/admin/cache - link cache stats and catalog breakdown
pub async fn cache_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse, AdminError> {
    validate_admin_key(&state, query.key.as_deref())?;

    Ok(Json(CacheStatsResponse {
        cache: state.cache.stats().await,
        catalog_channels: state.catalog.len(),
        categories: state.catalog.category_counts(),
    }))
}

/// POST /api/admin/cache/refresh - run a refresh now
///
/// Waits for the refresh to finish. A refresh already running is reported
/// as such instead of starting a second one.
pub async fn refresh_cache(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse, AdminError> {
    validate_admin_key(&state, query.key.as_deref())?;

    tracing::info!("Admin: manual channel cache refresh requested");

    match state.cache.refresh().await {
        Ok(RefreshOutcome::Refreshed { channels }) => Ok((
            StatusCode::OK,
            Json(RefreshResponse {
                success: true,
                message: format!("Refreshed {} channels", channels),
                channels: Some(channels),
            }),
        )),
        Ok(RefreshOutcome::AlreadyInProgress) => Ok((
            StatusCode::ACCEPTED,
            Json(RefreshResponse {
                success: true,
                message: "Refresh already in progress".to_string(),
                channels: None,
            }),
        )),
        Err(e) => {
            tracing::error!("Admin: channel cache refresh failed: {}", e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": e.to_string() })),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{test_state, TEST_ADMIN_KEY};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn status_of(method: &str, uri: &str) -> StatusCode {
        let app = crate::build_router(test_state().await);
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
    }

    #[tokio::test]
    async fn test_admin_requires_key() {
        assert_eq!(status_of("GET", "/api/admin/cache").await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of("GET", "/api/admin/cache?key=wrong").await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of("GET", &format!("/api/admin/cache?key={}", TEST_ADMIN_KEY)).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_is_bad_gateway() {
        // The test listing returns no channels
        assert_eq!(
            status_of(
                "POST",
                &format!("/api/admin/cache/refresh?key={}", TEST_ADMIN_KEY)
            )
            .await,
            StatusCode::BAD_GATEWAY
        );
    }
}
