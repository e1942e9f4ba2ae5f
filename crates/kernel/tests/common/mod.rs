#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! This module provides test infrastructure that uses the REAL kernel code:
//! the same router, middleware and state as the `folio` binary, backed by an
//! in-memory catalog so each test starts from an empty, private store.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use folio_kernel::catalog::{CatalogStore, MemoryCatalog};
use folio_kernel::models::{NewAuthor, NewBook};
use folio_kernel::routes;
use folio_kernel::state::AppState;
use folio_test_utils::Library;

/// Bearer token accepted by every [`TestApp`].
pub const TOKEN: &str = "test-token";

/// Test application wrapper using the REAL kernel routes and state.
pub struct TestApp {
    router: Router,
    pub catalog: Arc<MemoryCatalog>,
    pub state: AppState,
}

impl TestApp {
    /// Create a test application over an empty catalog.
    pub fn new() -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        let state = AppState::with_catalog(catalog.clone(), vec![TOKEN.to_string()])
            .expect("Failed to initialize AppState");
        let router = routes::app(state.clone());

        Self {
            router,
            catalog,
            state,
        }
    }

    /// Create a test application preloaded with `library`.
    pub async fn with_library(library: &Library) -> Self {
        let app = Self::new();
        app.load(library).await;
        app
    }

    /// Insert every author, then every book, in order.
    pub async fn load(&self, library: &Library) {
        for author in &library.authors {
            self.catalog
                .create_author(&NewAuthor::new(&author.name))
                .await
                .expect("Failed to insert author");
        }
        for book in &library.books {
            self.catalog
                .create_book(&NewBook::new(
                    &book.title,
                    book.publication_year,
                    book.author,
                ))
                .await
                .expect("Failed to insert book");
        }
    }

    /// Send a request to the test application.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// GET `uri` and return status and JSON body.
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .request(Request::get(uri).body(Body::empty()).unwrap())
            .await;
        let status = response.status();
        (status, response_json(response).await)
    }

    /// Send an authenticated write with a JSON body.
    pub async fn write(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.request(request).await;
        let status = response.status();
        (status, response_json(response).await)
    }
}

/// Parse a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
    })
}
