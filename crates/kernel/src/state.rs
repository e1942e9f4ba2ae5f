//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::catalog::{CatalogStore, MemoryCatalog, PgCatalog};
use crate::config::Config;
use crate::db;
use crate::query::ListEndpoint;
use crate::services::Reporter;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Catalog storage backend.
    catalog: Arc<dyn CatalogStore>,

    /// `/books/` listing composer.
    books: ListEndpoint,

    /// `/authors/` listing composer.
    authors: ListEndpoint,

    reporter: Reporter,

    /// Bearer tokens accepted for writes.
    api_tokens: Vec<String>,
}

impl AppState {
    /// Connect the configured store and build every endpoint.
    pub async fn new(config: &Config) -> Result<Self> {
        let catalog: Arc<dyn CatalogStore> = if config.database_url.is_some() {
            let pool = db::create_pool(config).await?;
            db::run_migrations(&pool).await?;
            info!("connected to PostgreSQL catalog");
            Arc::new(PgCatalog::new(pool))
        } else {
            warn!("DATABASE_URL not set; using an in-memory catalog");
            Arc::new(MemoryCatalog::new())
        };

        if config.api_tokens.is_empty() {
            warn!("API_TOKENS not set; all write requests will be rejected");
        }

        Self::with_catalog(catalog, config.api_tokens.clone())
    }

    /// Build state around an existing store.
    ///
    /// Fails if any listing or report is declared inconsistently.
    pub fn with_catalog(catalog: Arc<dyn CatalogStore>, api_tokens: Vec<String>) -> Result<Self> {
        let books = ListEndpoint::books().context("invalid book listing")?;
        let authors = ListEndpoint::authors().context("invalid author listing")?;
        let reporter = Reporter::new().context("invalid reporter filters")?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                catalog,
                books,
                authors,
                reporter,
                api_tokens,
            }),
        })
    }

    /// Get the catalog store.
    pub fn catalog(&self) -> &dyn CatalogStore {
        self.inner.catalog.as_ref()
    }

    pub fn books(&self) -> &ListEndpoint {
        &self.inner.books
    }

    pub fn authors(&self) -> &ListEndpoint {
        &self.inner.authors
    }

    pub fn reporter(&self) -> &Reporter {
        &self.inner.reporter
    }

    /// Whether `token` is one of the configured API tokens.
    pub fn token_is_valid(&self, token: &str) -> bool {
        self.inner
            .api_tokens
            .iter()
            .fold(false, |found, known| {
                found | bool::from(known.as_bytes().ct_eq(token.as_bytes()))
            })
    }

    /// Check if the catalog store is reachable.
    pub async fn catalog_healthy(&self) -> bool {
        self.inner.catalog.is_healthy().await
    }
}
