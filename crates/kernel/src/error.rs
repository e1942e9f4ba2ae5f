//! Application error types.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::catalog::StoreError;
use crate::models::FieldError;
use crate::query::QueryError;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    /// Malformed parameter or body field.
    #[error("{message}")]
    Validation { field: String, message: String },

    /// A reference to a row that does not exist.
    #[error("{message}")]
    ReferentialIntegrity { field: String, message: String },

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Validation { param, message } => Self::Validation {
                field: param,
                message,
            },
            // Endpoints are validated at startup; reaching this is a bug.
            QueryError::Config(_) => Self::Internal(anyhow::Error::new(err)),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingAuthor(id) => Self::ReferentialIntegrity {
                field: "author".to_string(),
                message: format!("Invalid pk \"{id}\" - object does not exist."),
            },
            StoreError::Query(err) => err.into(),
            StoreError::Database(err) => Self::Database(err),
        }
    }
}

impl From<FieldError> for AppError {
    fn from(err: FieldError) -> Self {
        Self::Validation {
            field: err.field.to_string(),
            message: err.message,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation("body", rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::ReferentialIntegrity { .. } => StatusCode::BAD_REQUEST,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                ErrorResponse {
                    error: "internal server error".to_string(),
                    field: None,
                }
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                ErrorResponse {
                    error: "internal server error".to_string(),
                    field: None,
                }
            }
            AppError::Validation { field, message }
            | AppError::ReferentialIntegrity { field, message } => ErrorResponse {
                error: message.clone(),
                field: Some(field.clone()),
            },
            _ => ErrorResponse {
                error: self.to_string(),
                field: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;
