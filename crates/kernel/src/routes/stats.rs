//! Catalog statistics routes.

use axum::{
    Router,
    extract::{Query, State},
    response::Json,
    routing::get,
};

use crate::error::AppResult;
use crate::models::BookRecord;
use crate::query::QueryParams;
use crate::services::{AuthorAnalytics, CatalogSummary};
use crate::state::AppState;

/// Create the stats router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats/", get(summary))
        .route("/stats/search/", get(search))
        .route("/stats/author-analytics/", get(author_analytics))
}

async fn summary(State(state): State<AppState>) -> AppResult<Json<CatalogSummary>> {
    let summary = state.reporter().summary(state.catalog()).await?;
    Ok(Json(summary))
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> AppResult<Json<Vec<BookRecord>>> {
    let params = QueryParams::from(params);
    let books = state.reporter().search(state.catalog(), &params).await?;
    Ok(Json(books))
}

async fn author_analytics(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> AppResult<Json<Vec<AuthorAnalytics>>> {
    let params = QueryParams::from(params);
    let authors = state
        .reporter()
        .author_analytics(state.catalog(), &params)
        .await?;
    Ok(Json(authors))
}
