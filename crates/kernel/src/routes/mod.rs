//! HTTP route handlers.

pub mod author;
pub mod book;
pub mod health;
pub mod stats;

use axum::Router;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::middleware::require_api_token;
use crate::state::AppState;

/// Body of create, update and delete responses.
#[derive(Debug, Serialize)]
pub struct MessageResponse<T> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> MessageResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

impl MessageResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }
}

/// Every catalog route, with write authentication and request tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(book::router())
        .merge(author::router())
        .merge(stats::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_api_token,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
