//! Admin token check.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Expected admin token. `None` leaves admin routes open.
#[derive(Clone, Default)]
pub struct AdminToken(Option<Arc<str>>);

impl AdminToken {
    #[must_use]
    pub fn new(token: Option<Arc<str>>) -> Self {
        Self(token.filter(|t| !t.is_empty()))
    }

    /// Constant-time comparison against the configured token.
    #[must_use]
    pub fn accepts(&self, provided: Option<&str>) -> bool {
        match (&self.0, provided) {
            (None, _) => true,
            (Some(expected), Some(provided)) => {
                provided.as_bytes().ct_eq(expected.as_bytes()).into()
            }
            (Some(_), None) => false,
        }
    }
}

/// Rejects admin requests without a matching `X-Admin-Token` with `401`.
pub async fn admin_auth_middleware(
    State(token): State<AdminToken>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request.headers().get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok());

    if token.accepts(provided) {
        return next.run(request).await;
    }

    warn!(
        path = %request.uri().path(),
        token_present = provided.is_some(),
        "admin request rejected"
    );
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized", "code": "UNAUTHORIZED" })))
        .into_response()
}
