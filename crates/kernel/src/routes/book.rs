//! Book API routes.
//!
//! Listing, lookup and write endpoints, plus the combined list/create and
//! detail/update/delete paths.

use axum::{
    Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
};
use tracing::info;

use super::MessageResponse;
use crate::error::{AppError, AppResult};
use crate::models::{BookInput, BookRecord};
use crate::query::QueryParams;
use crate::state::AppState;

/// Create the book router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/books/", get(list_books))
        .route("/books/create/", post(create_book))
        .route("/books/{id}/", get(get_book))
        .route("/books/update/{id}/", put(replace_book).patch(patch_book))
        .route("/books/delete/{id}/", delete(delete_book))
        // Combined endpoints
        .route("/books/combined/", get(list_books).post(create_book))
        .route(
            "/books/{id}/combined/",
            get(get_book)
                .put(replace_book)
                .patch(patch_book)
                .delete(delete_book),
        )
}

async fn list_books(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> AppResult<Json<Vec<BookRecord>>> {
    let params = QueryParams::from(params);
    let query = state.books().compose(&params)?;
    let books = state.catalog().fetch_books(&query).await?;
    Ok(Json(books))
}

async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<BookRecord>> {
    let book = state
        .catalog()
        .find_book(id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(book))
}

async fn create_book(
    State(state): State<AppState>,
    payload: Result<Json<BookInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<MessageResponse<BookRecord>>)> {
    let Json(input) = payload?;
    let new_book = input.into_complete()?;
    new_book.validate()?;

    let catalog = state.catalog();
    let book = catalog.create_book(&new_book).await?;
    info!(book_id = book.id, title = %book.title, "book created");

    let record = catalog.find_book(book.id).await?.ok_or(AppError::NotFound)?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::with_data("Book created successfully", record)),
    ))
}

async fn replace_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<BookInput>, JsonRejection>,
) -> AppResult<Json<MessageResponse<BookRecord>>> {
    let Json(input) = payload?;
    update_book(&state, id, input, false).await
}

async fn patch_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<BookInput>, JsonRejection>,
) -> AppResult<Json<MessageResponse<BookRecord>>> {
    let Json(input) = payload?;
    update_book(&state, id, input, true).await
}

/// PUT replaces every field; PATCH overlays the supplied ones.
async fn update_book(
    state: &AppState,
    id: i64,
    input: BookInput,
    partial: bool,
) -> AppResult<Json<MessageResponse<BookRecord>>> {
    let catalog = state.catalog();
    let existing = catalog.find_book(id).await?.ok_or(AppError::NotFound)?;

    let new_book = if partial {
        input.merge(&existing.book)
    } else {
        input.into_complete()?
    };
    new_book.validate()?;

    let book = catalog
        .update_book(id, &new_book)
        .await?
        .ok_or(AppError::NotFound)?;
    info!(book_id = book.id, title = %book.title, partial, "book updated");

    let record = catalog.find_book(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(MessageResponse::with_data(
        "Book updated successfully",
        record,
    )))
}

async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse<()>>> {
    let book = state
        .catalog()
        .delete_book(id)
        .await?
        .ok_or(AppError::NotFound)?;
    info!(book_id = book.id, title = %book.title, "book deleted");

    Ok(Json(MessageResponse::message(format!(
        "Book \"{}\" deleted successfully",
        book.title
    ))))
}
