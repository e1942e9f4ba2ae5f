//! API token authentication middleware.
//!
//! Reads are open. Requests with a write method (POST, PUT, PATCH, DELETE)
//! must carry `Authorization: Bearer <token>` naming one of the configured
//! API tokens, otherwise they are answered with 401 before reaching a
//! handler.

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

use crate::state::AppState;

/// Whether `method` modifies the catalog.
fn is_write(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Middleware that requires a valid API token for writes.
pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !is_write(request.method()) {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if state.token_is_valid(token) => next.run(request).await,
        Some(_) => {
            debug!(method = %request.method(), path = %request.uri().path(), "invalid API token");
            unauthorized("Invalid API token")
        }
        None => {
            debug!(method = %request.method(), path = %request.uri().path(), "missing API token");
            unauthorized("Authentication credentials were not provided.")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Bearer")],
        axum::Json(json!({ "error": message })),
    )
        .into_response()
}
