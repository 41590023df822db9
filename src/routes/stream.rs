//! Stream resolution endpoints
//!
//! Always answer 200 with `{"streams": [...]}`; an unresolvable id is an
//! empty list, never an error status.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::config::AddonSettings;
use crate::models::StreamsResponse;
use crate::services::addon_config;
use crate::AppState;

/// Ids may arrive as `tt123:1:2.json`
fn strip_json_suffix(id: &str) -> &str {
    id.strip_suffix(".json").unwrap_or(id)
}

async fn resolve(
    state: &AppState,
    content_type: &str,
    id: &str,
    settings: &AddonSettings,
) -> StreamsResponse {
    let id = strip_json_suffix(id);
    tracing::debug!(content_type, "Stream request for {}", id);
    state.aggregator.resolve(id, settings).await
}

/// GET /stream/:type/:id - resolve with the environment settings
pub async fn streams(
    State(state): State<Arc<AppState>>,
    Path((content_type, id)): Path<(String, String)>,
) -> Json<StreamsResponse> {
    Json(resolve(&state, &content_type, &id, &state.settings).await)
}

/// GET /:config/stream/:type/:id - resolve with the request config overlaid
pub async fn configured_streams(
    State(state): State<Arc<AppState>>,
    Path((config, content_type, id)): Path<(String, String, String)>,
) -> Json<StreamsResponse> {
    let settings = state.settings.overlay(&addon_config::decode(&config));
    Json(resolve(&state, &content_type, &id, &settings).await)
}
