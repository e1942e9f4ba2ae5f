//! Query composition errors.

use thiserror::Error;

/// Errors raised while building filter sets or composing a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A request parameter carried a value the matcher cannot use.
    #[error("invalid value for '{param}': {message}")]
    Validation { param: String, message: String },

    /// A filter set or endpoint was declared inconsistently.
    ///
    /// Raised while endpoints are built at startup, never per request.
    #[error("query configuration error: {0}")]
    Config(String),
}

impl QueryError {
    pub(crate) fn validation(param: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            param: param.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
