//! Author API routes.

use axum::{
    Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
};
use tracing::info;

use super::MessageResponse;
use crate::error::{AppError, AppResult};
use crate::models::{AuthorRecord, NewAuthor};
use crate::query::QueryParams;
use crate::state::AppState;

/// Create the author router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/authors/", get(list_authors))
        .route("/authors/create/", post(create_author))
        .route("/authors/{id}/", get(get_author))
        .route("/authors/delete/{id}/", delete(delete_author))
}

/// List authors with book counts and nested books.
async fn list_authors(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> AppResult<Json<Vec<AuthorRecord>>> {
    let params = QueryParams::from(params);
    let query = state.authors().compose(&params)?;
    let authors = state.catalog().fetch_authors(&query).await?;
    Ok(Json(authors))
}

async fn get_author(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<AuthorRecord>> {
    let author = state
        .catalog()
        .find_author(id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(author))
}

async fn create_author(
    State(state): State<AppState>,
    payload: Result<Json<NewAuthor>, JsonRejection>,
) -> AppResult<(StatusCode, Json<MessageResponse<AuthorRecord>>)> {
    let Json(input) = payload?;
    input.validate()?;

    let catalog = state.catalog();
    let author = catalog.create_author(&input).await?;
    info!(author_id = author.id, name = %author.name, "author created");

    let record = catalog
        .find_author(author.id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::with_data("Author created successfully", record)),
    ))
}

/// Delete an author together with every book they wrote.
async fn delete_author(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse<()>>> {
    let author = state
        .catalog()
        .delete_author(id)
        .await?
        .ok_or(AppError::NotFound)?;
    info!(author_id = author.id, name = %author.name, "author deleted");

    Ok(Json(MessageResponse::message(format!(
        "Author \"{}\" deleted successfully",
        author.name
    ))))
}
