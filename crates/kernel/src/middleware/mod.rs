//! HTTP middleware components.

pub mod api_token;

pub use api_token::require_api_token;
