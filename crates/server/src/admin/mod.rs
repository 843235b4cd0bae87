//! Administrative cache endpoints.
//!
//! Mounted on the main listener next to the proxy routes. Every route sits behind
//! [`middleware::admin_auth_middleware`]; when no token is configured the routes are open.
//!
//! | Route | Action |
//! |-------|--------|
//! | `POST /admin/cache/clear` | purge every entry |
//! | `DELETE /admin/cache/{key}` | purge one entry by cache key |
//! | `GET /admin/cache/stats` | cache counters and occupancy |
//! | `DELETE /cache` | purge every entry (legacy path) |

pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};

use crate::AppState;

/// Creates the admin router, already bound to `state`.
pub fn create_admin_router(state: AppState) -> Router {
    let token = middleware::AdminToken::new(state.config.admin.token.clone().map(Arc::from));

    Router::new()
        .route("/admin/cache/clear", post(handlers::cache::clear_cache))
        .route("/admin/cache/stats", get(handlers::cache::get_stats))
        .route("/admin/cache/{key}", delete(handlers::cache::delete_entry))
        .route("/cache", delete(handlers::cache::clear_cache))
        .layer(axum_middleware::from_fn_with_state(token, middleware::admin_auth_middleware))
        .with_state(state)
}
