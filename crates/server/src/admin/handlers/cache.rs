//! Cache purge and statistics handlers.
//!
//! Purges are logged under the `audit` target with the caller's request id.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::info;

use crate::{middleware::request_id, AppState};

/// `POST /admin/cache/clear` and `DELETE /cache`
#[allow(clippy::unused_async)]
pub async fn clear_cache(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let cache = state.proxy_engine.cache();
    let cleared = cache.len();
    cache.clear();

    info!(
        target: "audit",
        action = "cache.clear",
        cleared,
        request_id = request_id(&headers).unwrap_or_default(),
        "cache cleared by admin request"
    );

    Json(json!({ "message": "Cache cleared successfully", "cleared": cleared }))
}

/// `DELETE /admin/cache/{key}`
#[allow(clippy::unused_async)]
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let deleted = state.proxy_engine.cache().delete(&key);

    info!(
        target: "audit",
        action = "cache.delete",
        key = %key,
        deleted,
        request_id = request_id(&headers).unwrap_or_default(),
        "cache entry purge requested"
    );

    let status = if deleted { StatusCode::OK } else { StatusCode::NOT_FOUND };
    (status, Json(json!({ "key": key, "deleted": deleted })))
}

/// `GET /admin/cache/stats`
#[allow(clippy::unused_async)]
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.proxy_engine.cache().stats())
}
